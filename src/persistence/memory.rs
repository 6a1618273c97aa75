use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{
    ChangeSet, ChapterRepository, JobRepository, PersistenceError, PersistenceResult, StoredBook,
};
use crate::models::{BookId, Chapter, ChapterId, JobId, PublishFormat, PublishJob};

#[derive(Debug, Default)]
struct BookRows {
    chapters: HashMap<ChapterId, Chapter>,
    version: u64,
}

/// Chapter storage held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryChapterRepository {
    books: Mutex<HashMap<BookId, BookRows>>,
}

impl InMemoryChapterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a book with pre-existing rows, bypassing normalization.
    pub fn seed(&self, book_id: BookId, chapters: Vec<Chapter>) {
        let rows = BookRows {
            chapters: chapters.into_iter().map(|c| (c.id, c)).collect(),
            version: 0,
        };
        self.books.lock().insert(book_id, rows);
    }

    /// Bump a book's version as if another writer had committed.
    pub fn bump_version(&self, book_id: BookId) {
        if let Some(rows) = self.books.lock().get_mut(&book_id) {
            rows.version += 1;
        }
    }

    pub fn version(&self, book_id: BookId) -> Option<u64> {
        self.books.lock().get(&book_id).map(|rows| rows.version)
    }
}

#[async_trait]
impl ChapterRepository for InMemoryChapterRepository {
    async fn create_book(&self, book_id: BookId) -> PersistenceResult<u64> {
        let mut books = self.books.lock();
        if books.contains_key(&book_id) {
            return Err(PersistenceError::BookExists(book_id));
        }
        books.insert(book_id, BookRows::default());
        Ok(0)
    }

    async fn delete_book(&self, book_id: BookId) -> PersistenceResult<()> {
        self.books
            .lock()
            .remove(&book_id)
            .map(|_| ())
            .ok_or(PersistenceError::BookNotFound(book_id))
    }

    async fn load_book(&self, book_id: BookId) -> PersistenceResult<Option<StoredBook>> {
        Ok(self.books.lock().get(&book_id).map(|rows| StoredBook {
            chapters: rows.chapters.values().cloned().collect(),
            version: rows.version,
        }))
    }

    async fn save_changes(
        &self,
        book_id: BookId,
        expected_version: u64,
        changes: &ChangeSet,
    ) -> PersistenceResult<u64> {
        let mut books = self.books.lock();
        let rows = books
            .get_mut(&book_id)
            .ok_or(PersistenceError::BookNotFound(book_id))?;

        if rows.version != expected_version {
            return Err(PersistenceError::VersionConflict {
                book_id,
                expected: expected_version,
                actual: rows.version,
            });
        }

        for id in &changes.removals {
            rows.chapters.remove(id);
        }
        for chapter in &changes.upserts {
            rows.chapters.insert(chapter.id, chapter.clone());
        }
        rows.version += 1;

        Ok(rows.version)
    }
}

/// Job storage held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: DashMap<JobId, PublishJob>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save_job(&self, job: &PublishJob) -> PersistenceResult<()> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, job_id: JobId) -> PersistenceResult<Option<PublishJob>> {
        Ok(self.jobs.get(&job_id).map(|entry| entry.value().clone()))
    }

    async fn list_jobs(&self, book_id: BookId) -> PersistenceResult<Vec<PublishJob>> {
        let mut jobs: Vec<PublishJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.book_id == book_id)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn find_latest_job(
        &self,
        book_id: BookId,
        format: PublishFormat,
    ) -> PersistenceResult<Option<PublishJob>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| entry.book_id == book_id && entry.format == format)
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone()))
    }
}
