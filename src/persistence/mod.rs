//! # Persistence Collaborators
//!
//! The core never talks to a database directly. From durable storage it needs
//! to read every chapter of a book, write a book's chapter changes atomically,
//! read and write a job by id, list a book's jobs, and find the latest job for
//! a `(book, format)` pair. Those are the two traits here; the in-memory
//! implementations back tests and single-process deployments.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{BookId, Chapter, ChapterId, JobId, PublishFormat, PublishJob};

pub use memory::{InMemoryChapterRepository, InMemoryJobRepository};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("Book {0} does not exist")]
    BookNotFound(BookId),

    #[error("Book {0} already exists")]
    BookExists(BookId),

    #[error("Book {book_id} was modified concurrently: expected version {expected}, found {actual}")]
    VersionConflict {
        book_id: BookId,
        expected: u64,
        actual: u64,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// All chapters of one book plus the version used for optimistic concurrency.
#[derive(Debug, Clone, Default)]
pub struct StoredBook {
    pub chapters: Vec<Chapter>,
    pub version: u64,
}

/// Chapter rows touched by one tree operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub upserts: Vec<Chapter>,
    pub removals: Vec<ChapterId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.removals.len()
    }
}

#[async_trait]
pub trait ChapterRepository: Send + Sync {
    /// Register an empty book at version 0.
    async fn create_book(&self, book_id: BookId) -> PersistenceResult<u64>;

    async fn delete_book(&self, book_id: BookId) -> PersistenceResult<()>;

    /// `None` when the book does not exist.
    async fn load_book(&self, book_id: BookId) -> PersistenceResult<Option<StoredBook>>;

    /// Apply every change or none. Fails with `VersionConflict` when the
    /// stored version differs from `expected_version`; returns the new version.
    async fn save_changes(
        &self,
        book_id: BookId,
        expected_version: u64,
        changes: &ChangeSet,
    ) -> PersistenceResult<u64>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn save_job(&self, job: &PublishJob) -> PersistenceResult<()>;

    async fn load_job(&self, job_id: JobId) -> PersistenceResult<Option<PublishJob>>;

    /// Every job of a book, terminal or not, oldest first.
    async fn list_jobs(&self, book_id: BookId) -> PersistenceResult<Vec<PublishJob>>;

    /// Most recently created job for the pair, terminal or not.
    async fn find_latest_job(
        &self,
        book_id: BookId,
        format: PublishFormat,
    ) -> PersistenceResult<Option<PublishJob>>;
}
