//! # Job Registry
//!
//! Owns every publish job record: dedup of concurrent submissions, the
//! per-job write path, and the non-blocking reads callers poll.

pub mod job_registry;

pub use job_registry::{Admission, JobRegistry};
