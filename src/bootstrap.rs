//! # Scribe Core
//!
//! Bootstrap facade that wires the tree store, job registry, publish
//! orchestrator and event publisher over one configuration.

use std::sync::Arc;
use tracing::info;

use crate::config::ScribeConfig;
use crate::error::Result;
use crate::events::EventPublisher;
use crate::models::BookId;
use crate::persistence::{
    ChapterRepository, InMemoryChapterRepository, InMemoryJobRepository, JobRepository,
};
use crate::publish::{BuilderClient, PublishOrchestrator};
use crate::registry::JobRegistry;
use crate::tree::TreeStore;

pub struct ScribeCore {
    config: ScribeConfig,
    events: EventPublisher,
    tree_store: Arc<TreeStore>,
    registry: Arc<JobRegistry>,
    orchestrator: PublishOrchestrator,
}

impl std::fmt::Debug for ScribeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScribeCore")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

impl ScribeCore {
    pub fn new(
        config: ScribeConfig,
        chapter_repository: Arc<dyn ChapterRepository>,
        job_repository: Arc<dyn JobRepository>,
        builder: Arc<dyn BuilderClient>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventPublisher::new(config.events.channel_capacity);
        let tree_store = Arc::new(TreeStore::new(
            chapter_repository,
            config.tree.clone(),
            events.clone(),
        ));
        let registry = Arc::new(JobRegistry::new(job_repository, events.clone()));
        let orchestrator = PublishOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&tree_store),
            builder,
            config.publish.clone(),
        );

        info!(
            poll_interval_ms = config.publish.poll_interval_ms,
            running_timeout_seconds = config.publish.running_timeout_seconds,
            max_level = ?config.tree.max_level,
            "Scribe core initialized"
        );

        Ok(Self {
            config,
            events,
            tree_store,
            registry,
            orchestrator,
        })
    }

    /// Core backed by process-memory repositories.
    pub fn in_memory(config: ScribeConfig, builder: Arc<dyn BuilderClient>) -> Result<Self> {
        Self::new(
            config,
            Arc::new(InMemoryChapterRepository::new()),
            Arc::new(InMemoryJobRepository::new()),
            builder,
        )
    }

    pub fn config(&self) -> &ScribeConfig {
        &self.config
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn tree(&self) -> &TreeStore {
        &self.tree_store
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn publisher(&self) -> &PublishOrchestrator {
        &self.orchestrator
    }

    /// Delete a book. Publish tasks still running for it are stopped first;
    /// their job records keep their last state.
    pub async fn delete_book(&self, book_id: BookId) -> Result<()> {
        self.orchestrator.detach_book(book_id);
        self.tree_store.delete_book(book_id).await
    }

    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
    }
}
