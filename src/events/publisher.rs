use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{BookId, ChapterId, JobId, PublishFormat};
use crate::state_machine::JobState;

/// Something observable happened in the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    TreeChanged {
        book_id: BookId,
        operation: String,
        chapter_id: Option<ChapterId>,
        version: u64,
    },
    JobTransitioned {
        job_id: JobId,
        book_id: BookId,
        format: PublishFormat,
        from: JobState,
        to: JobState,
        error: Option<String>,
        result_url: Option<String>,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TreeChanged { .. } => "tree.changed",
            Self::JobTransitioned { .. } => "job.transitioned",
        }
    }
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: LifecycleEvent,
    pub published_at: DateTime<Utc>,
}

/// Fan-out publisher for lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: LifecycleEvent) {
        let published = PublishedEvent {
            event,
            published_at: Utc::now(),
        };

        if self.sender.send(published).is_err() {
            tracing::trace!("No lifecycle event subscribers");
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
