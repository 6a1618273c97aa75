//! # Tree Store
//!
//! Serialized, write-through access to every book's chapter hierarchy.
//!
//! Each book has its own async mutex; operations on one book are linearized
//! while different books proceed independently. An operation runs against a
//! clone of the book's arena, its row changes are written to the
//! [`ChapterRepository`] in one atomic call, and only then does the clone
//! replace the cached tree. A failed operation or a failed write leaves the
//! cached tree exactly as it was.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::book_tree::{BookTree, DeleteStrategy};
use super::snapshot::ChapterForest;
use crate::config::TreeConfig;
use crate::error::{Result, ScribeError};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::logging::log_tree_operation;
use crate::models::{BookId, Chapter, ChapterId, ChapterUpdate, NewChapter};
use crate::persistence::{ChangeSet, ChapterRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Live,
    /// The durable copy moved on without us; reload before the next operation
    Stale,
    Removed,
}

#[derive(Debug)]
struct BookSlot {
    tree: BookTree,
    version: u64,
    state: SlotState,
}

pub struct TreeStore {
    books: DashMap<BookId, Arc<Mutex<BookSlot>>>,
    repository: Arc<dyn ChapterRepository>,
    config: TreeConfig,
    events: EventPublisher,
}

impl TreeStore {
    pub fn new(
        repository: Arc<dyn ChapterRepository>,
        config: TreeConfig,
        events: EventPublisher,
    ) -> Self {
        Self {
            books: DashMap::new(),
            repository,
            config,
            events,
        }
    }

    /// Register a new, empty book.
    pub async fn create_book(&self, book_id: BookId) -> Result<()> {
        let version = self.repository.create_book(book_id).await?;
        let slot = BookSlot {
            tree: BookTree::new(book_id),
            version,
            state: SlotState::Live,
        };
        self.books.insert(book_id, Arc::new(Mutex::new(slot)));

        log_tree_operation("create_book", book_id, None, "ok", None);
        Ok(())
    }

    /// Remove a book and all of its chapters.
    pub async fn delete_book(&self, book_id: BookId) -> Result<()> {
        let (slot, mut guard) = self.lock_book(book_id).await?;

        self.repository.delete_book(book_id).await?;
        guard.state = SlotState::Removed;
        self.books
            .remove_if(&book_id, |_, cached| Arc::ptr_eq(cached, &slot));
        drop(guard);

        log_tree_operation("delete_book", book_id, None, "ok", None);
        Ok(())
    }

    /// Append a chapter as the last sibling under `new.parent_id`.
    pub async fn insert(&self, book_id: BookId, new: NewChapter) -> Result<Chapter> {
        let max_level = self.config.max_level;
        let parent_id = new.parent_id;
        self.mutate(book_id, "insert", parent_id, move |tree| {
            tree.insert(new, max_level)
        })
        .await
    }

    /// Move a chapter (and its subtree) to `new_index` under `new_parent_id`.
    pub async fn move_chapter(
        &self,
        book_id: BookId,
        chapter_id: ChapterId,
        new_parent_id: Option<ChapterId>,
        new_index: usize,
    ) -> Result<Chapter> {
        let max_level = self.config.max_level;
        self.mutate(book_id, "move", Some(chapter_id), move |tree| {
            tree.move_chapter(chapter_id, new_parent_id, new_index, max_level)
        })
        .await
    }

    /// Delete a chapter; returns every removed chapter.
    pub async fn delete(
        &self,
        book_id: BookId,
        chapter_id: ChapterId,
        strategy: DeleteStrategy,
    ) -> Result<Vec<Chapter>> {
        self.mutate(book_id, "delete", Some(chapter_id), move |tree| {
            tree.delete(chapter_id, strategy)
        })
        .await
    }

    /// Edit title and/or content without touching position.
    pub async fn update(
        &self,
        book_id: BookId,
        chapter_id: ChapterId,
        update: ChapterUpdate,
    ) -> Result<Chapter> {
        if update.is_empty() {
            return self.get(book_id, chapter_id).await;
        }
        self.mutate(book_id, "update", Some(chapter_id), move |tree| {
            tree.update(chapter_id, update)
        })
        .await
    }

    pub async fn get(&self, book_id: BookId, chapter_id: ChapterId) -> Result<Chapter> {
        let (_, guard) = self.lock_book(book_id).await?;
        guard
            .tree
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| ScribeError::not_found("chapter", chapter_id))
    }

    /// Ordered children of `parent_id` (`None` for the roots).
    pub async fn children(
        &self,
        book_id: BookId,
        parent_id: Option<ChapterId>,
    ) -> Result<Vec<Chapter>> {
        let (_, guard) = self.lock_book(book_id).await?;
        if let Some(parent_id) = parent_id {
            if guard.tree.get(parent_id).is_none() {
                return Err(ScribeError::not_found("chapter", parent_id));
            }
        }
        Ok(guard.tree.children(parent_id).into_iter().cloned().collect())
    }

    /// Immutable pre-order view of the whole book.
    pub async fn snapshot(&self, book_id: BookId) -> Result<ChapterForest> {
        let (_, guard) = self.lock_book(book_id).await?;
        Ok(guard.tree.forest())
    }

    async fn mutate<T, F>(
        &self,
        book_id: BookId,
        operation: &'static str,
        chapter_id: Option<ChapterId>,
        apply: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut BookTree) -> Result<T> + Send,
        T: Send,
    {
        let (_, mut guard) = self.lock_book(book_id).await?;

        let mut working = guard.tree.clone();
        let output = match apply(&mut working) {
            Ok(output) => output,
            Err(e) => {
                log_tree_operation(
                    operation,
                    book_id,
                    chapter_id,
                    "rejected",
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        };

        let changes = working.diff(&guard.tree);
        if !changes.is_empty() {
            match self
                .repository
                .save_changes(book_id, guard.version, &changes)
                .await
            {
                Ok(version) => {
                    guard.version = version;
                    guard.tree = working;
                }
                Err(e) => {
                    let error = ScribeError::from(e);
                    if matches!(error, ScribeError::Conflict { .. }) {
                        warn!(
                            book_id = %book_id,
                            operation = operation,
                            "⚠️ Book modified concurrently, cached tree marked stale"
                        );
                        guard.state = SlotState::Stale;
                    }
                    return Err(error);
                }
            }
        }

        debug_assert!(
            guard.tree.check_invariants().is_ok(),
            "tree invariants violated after {operation}"
        );
        let version = guard.version;
        drop(guard);

        debug!(
            book_id = %book_id,
            operation = operation,
            rows_written = changes.len(),
            version = version,
            "Tree operation committed"
        );
        log_tree_operation(operation, book_id, chapter_id, "ok", None);
        self.events.publish(LifecycleEvent::TreeChanged {
            book_id,
            operation: operation.to_string(),
            chapter_id,
            version,
        });

        Ok(output)
    }

    /// Lock a book, loading or reloading it from the repository as needed.
    async fn lock_book(
        &self,
        book_id: BookId,
    ) -> Result<(Arc<Mutex<BookSlot>>, OwnedMutexGuard<BookSlot>)> {
        let slot = self.slot(book_id).await?;
        let mut guard = Arc::clone(&slot).lock_owned().await;

        match guard.state {
            SlotState::Live => {}
            SlotState::Removed => return Err(ScribeError::not_found("book", book_id)),
            SlotState::Stale => match self.load_tree(book_id).await? {
                Some((tree, version)) => {
                    guard.tree = tree;
                    guard.version = version;
                    guard.state = SlotState::Live;
                }
                None => {
                    guard.state = SlotState::Removed;
                    self.books
                        .remove_if(&book_id, |_, cached| Arc::ptr_eq(cached, &slot));
                    return Err(ScribeError::not_found("book", book_id));
                }
            },
        }

        Ok((slot, guard))
    }

    async fn slot(&self, book_id: BookId) -> Result<Arc<Mutex<BookSlot>>> {
        if let Some(slot) = self.books.get(&book_id).map(|entry| Arc::clone(entry.value())) {
            return Ok(slot);
        }

        let (tree, version) = self
            .load_tree(book_id)
            .await?
            .ok_or_else(|| ScribeError::not_found("book", book_id))?;

        let slot = Arc::new(Mutex::new(BookSlot {
            tree,
            version,
            state: SlotState::Live,
        }));
        Ok(Arc::clone(self.books.entry(book_id).or_insert(slot).value()))
    }

    /// Read a book from the repository, writing back any normalization.
    async fn load_tree(&self, book_id: BookId) -> Result<Option<(BookTree, u64)>> {
        let Some(stored) = self.repository.load_book(book_id).await? else {
            return Ok(None);
        };

        let rows: HashMap<ChapterId, Chapter> = stored
            .chapters
            .iter()
            .map(|chapter| (chapter.id, chapter.clone()))
            .collect();
        let tree = BookTree::from_chapters(book_id, stored.chapters)?;

        let repairs: Vec<Chapter> = tree
            .forest()
            .iter()
            .filter(|chapter| rows.get(&chapter.id) != Some(*chapter))
            .cloned()
            .collect();

        let mut version = stored.version;
        if !repairs.is_empty() {
            warn!(
                book_id = %book_id,
                repaired = repairs.len(),
                "🔧 Stored chapter order/level drifted, writing normalized values"
            );
            let changes = ChangeSet {
                upserts: repairs,
                removals: Vec::new(),
            };
            version = self
                .repository
                .save_changes(book_id, version, &changes)
                .await?;
        }

        Ok(Some((tree, version)))
    }
}
