//! # Publish
//!
//! Drives publish jobs against the external builder service: one submit, then
//! status polling with backoff until the build finishes, fails, times out or
//! is canceled.

pub mod backoff;
pub mod builder;
pub mod orchestrator;

pub use backoff::BackoffCalculator;
pub use builder::{BuildStatus, BuilderClient, BuilderError};
pub use orchestrator::PublishOrchestrator;
