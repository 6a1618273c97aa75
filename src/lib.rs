#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Scribe Core Rust
//!
//! Chapter hierarchy engine and publish-job orchestration for a book
//! authoring platform.
//!
//! ## Overview
//!
//! A book is an ordered forest of chapters. The core keeps each forest
//! consistent under concurrent edits (contiguous sibling order, levels that
//! follow depth, no cycles) and drives asynchronous publish jobs that hand a
//! snapshot of a book to an external builder service and poll it to
//! completion.
//!
//! ## Module Organization
//!
//! - [`tree`] - Ordering engine, per-book arena and the serialized tree store
//! - [`registry`] - Publish job records and submission dedup
//! - [`state_machine`] - Publish job lifecycle transitions
//! - [`publish`] - Builder contract, poll backoff and the orchestrator
//! - [`persistence`] - Repository traits and in-memory implementations
//! - [`events`] - Lifecycle event fan-out
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scribe_core::config::ScribeConfig;
//! use scribe_core::models::{BookId, NewChapter, PublishFormat};
//! use scribe_core::publish::BuilderClient;
//! use scribe_core::ScribeCore;
//! use std::sync::Arc;
//!
//! # async fn example(builder: Arc<dyn BuilderClient>) -> scribe_core::Result<()> {
//! let core = ScribeCore::in_memory(ScribeConfig::default(), builder)?;
//! let book_id = BookId::new();
//! core.tree().create_book(book_id).await?;
//!
//! let intro = core.tree().insert(book_id, NewChapter::new(None, "Intro")).await?;
//! core.tree()
//!     .insert(book_id, NewChapter::new(Some(intro.id), "Motivation"))
//!     .await?;
//!
//! let receipt = core.publisher().submit(book_id, PublishFormat::Epub).await?;
//! let job = core.publisher().status(receipt.job_id).await?;
//! println!("job {} is {}", job.id, job.state);
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod publish;
pub mod registry;
pub mod state_machine;
pub mod tree;

pub use bootstrap::ScribeCore;
pub use config::{ConfigManager, EventsConfig, PublishConfig, ScribeConfig, TreeConfig};
pub use error::{Result, ScribeError};
pub use events::{EventPublisher, LifecycleEvent};
pub use models::{
    BookId, Chapter, ChapterId, ChapterUpdate, JobId, JobReceipt, NewChapter, PublishFormat,
    PublishJob,
};
pub use publish::{BuildStatus, BuilderClient, BuilderError, PublishOrchestrator};
pub use registry::JobRegistry;
pub use state_machine::{JobEvent, JobState};
pub use tree::{ChapterForest, DeleteStrategy, TreeStore};
