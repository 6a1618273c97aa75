use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{BookId, JobId};
use crate::state_machine::JobState;

/// Output format of a publish job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishFormat {
    Pdf,
    Epub,
    Mobi,
}

impl PublishFormat {
    pub const ALL: [PublishFormat; 3] = [Self::Pdf, Self::Epub, Self::Mobi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Mobi => "mobi",
        }
    }
}

impl fmt::Display for PublishFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PublishFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "epub" => Ok(Self::Epub),
            "mobi" => Ok(Self::Mobi),
            _ => Err(format!("Invalid publish format: {s}")),
        }
    }
}

/// Lifecycle record of one build of one book in one format.
///
/// Invariant: `result_url.is_some()` exactly when `state == Succeeded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishJob {
    pub id: JobId,
    pub book_id: BookId,
    pub format: PublishFormat,
    pub state: JobState,
    pub external_handle: Option<String>,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Builder calls issued on behalf of this job (submit plus status polls).
    pub attempt_count: u32,
    pub consecutive_poll_failures: u32,
}

impl PublishJob {
    pub fn new(book_id: BookId, format: PublishFormat) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            book_id,
            format,
            state: JobState::Queued,
            external_handle: None,
            result_url: None,
            error: None,
            created_at: now,
            updated_at: now,
            attempt_count: 0,
            consecutive_poll_failures: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn receipt(&self) -> JobReceipt {
        JobReceipt {
            job_id: self.id,
            state: self.state,
        }
    }
}

/// What a caller gets back from `submit`: enough to poll with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReceipt {
    pub job_id: JobId,
    pub state: JobState,
}
