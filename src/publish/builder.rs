//! Contract for the external builder service.
//!
//! Implementations wrap whatever transport the deployment uses. The core only
//! relies on these three calls and on the error split below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{BookId, PublishFormat};
use crate::tree::ChapterForest;

/// What the builder reports for a submitted build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Running,
    Succeeded { artifact_url: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    /// Transport or service failure; the call may succeed if repeated
    #[error("builder unavailable: {0}")]
    Unavailable(String),

    /// The builder rejected the request itself
    #[error("builder rejected input: {0}")]
    InvalidInput(String),

    #[error("build cannot be canceled: {0}")]
    NotCancelable(String),
}

#[async_trait]
pub trait BuilderClient: Send + Sync + 'static {
    /// Start a build from a consistent snapshot of the book. Returns the
    /// builder's handle for the build.
    async fn submit(
        &self,
        book_id: BookId,
        format: PublishFormat,
        chapters: &ChapterForest,
    ) -> Result<String, BuilderError>;

    async fn status(&self, handle: &str) -> Result<BuildStatus, BuilderError>;

    async fn cancel(&self, handle: &str) -> Result<(), BuilderError>;
}
