//! # Chapter Forest Snapshots
//!
//! An immutable copy of a book's hierarchy taken under the book's lock.
//! Traversal is lazy and restartable: every call to [`ChapterForest::iter`]
//! walks the forest again in pre-order, siblings by `order`.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::sync::Arc;

use super::book_tree::BookTree;
use crate::models::{BookId, Chapter, ChapterId};

#[derive(Debug, Clone)]
pub struct ChapterForest {
    tree: Arc<BookTree>,
}

impl ChapterForest {
    pub(crate) fn new(tree: BookTree) -> Self {
        Self {
            tree: Arc::new(tree),
        }
    }

    pub fn book_id(&self) -> BookId {
        self.tree.book_id()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn get(&self, id: ChapterId) -> Option<&Chapter> {
        self.tree.get(id)
    }

    pub fn children(&self, parent: Option<ChapterId>) -> impl Iterator<Item = &Chapter> + '_ {
        self.tree
            .child_ids(parent)
            .iter()
            .filter_map(|id| self.tree.get(*id))
    }

    /// Pre-order walk over every chapter.
    pub fn iter(&self) -> PreOrder<'_> {
        let mut stack: Vec<ChapterId> = self.tree.child_ids(None).to_vec();
        stack.reverse();
        PreOrder {
            tree: &self.tree,
            stack,
        }
    }

    /// Owned nested rendition, used as the builder payload.
    pub fn nested(&self) -> Vec<ChapterNode> {
        self.nest(None)
    }

    fn nest(&self, parent: Option<ChapterId>) -> Vec<ChapterNode> {
        self.children(parent)
            .map(|chapter| ChapterNode {
                chapter: chapter.clone(),
                children: self.nest(Some(chapter.id)),
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ChapterForest {
    type Item = &'a Chapter;
    type IntoIter = PreOrder<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for ChapterForest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ChapterForest", 2)?;
        state.serialize_field("book_id", &self.book_id())?;
        state.serialize_field("chapters", &self.nested())?;
        state.end()
    }
}

pub struct PreOrder<'a> {
    tree: &'a BookTree,
    stack: Vec<ChapterId>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a Chapter;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.stack.pop()?;
            let tree = self.tree;
            self.stack.extend(tree.child_ids(Some(id)).iter().rev().copied());
            if let Some(chapter) = tree.get(id) {
                return Some(chapter);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChapterNode {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub children: Vec<ChapterNode>,
}
