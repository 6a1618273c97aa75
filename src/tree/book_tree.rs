//! # Book Tree
//!
//! Arena representation of one book's chapter hierarchy: a flat table of
//! chapters keyed by id plus, per parent, the ordered list of child ids.
//! Every public mutation leaves the arena satisfying the hierarchy
//! invariants (see [`BookTree::check_invariants`]); on error nothing changes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::ordering;
use super::snapshot::ChapterForest;
use crate::error::{Result, ScribeError};
use crate::models::{BookId, Chapter, ChapterId, ChapterUpdate, NewChapter};
use crate::persistence::ChangeSet;

const NO_CHILDREN: &[ChapterId] = &[];

/// What happens to the children of a deleted chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStrategy {
    /// Remove the chapter and its whole subtree.
    Cascade,
    /// Hand the direct children to the deleted chapter's parent, in its slot.
    PromoteChildren,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookTree {
    book_id: BookId,
    chapters: HashMap<ChapterId, Chapter>,
    children: HashMap<Option<ChapterId>, Vec<ChapterId>>,
}

impl BookTree {
    pub fn new(book_id: BookId) -> Self {
        Self {
            book_id,
            chapters: HashMap::new(),
            children: HashMap::new(),
        }
    }

    /// Build the arena from stored rows.
    ///
    /// Rows must belong to `book_id`, reference existing parents and form a
    /// forest. Stored `order` values only decide sibling sequence (ties broken
    /// by id); both `order` and `level` are renumbered afterwards.
    pub fn from_chapters(book_id: BookId, rows: Vec<Chapter>) -> Result<Self> {
        let mut chapters = HashMap::with_capacity(rows.len());
        for chapter in rows {
            if chapter.book_id != book_id {
                return Err(ScribeError::Persistence(format!(
                    "chapter {} belongs to book {}, not {}",
                    chapter.id, chapter.book_id, book_id
                )));
            }
            if let Some(duplicate) = chapters.insert(chapter.id, chapter) {
                return Err(ScribeError::Persistence(format!(
                    "chapter {} stored twice",
                    duplicate.id
                )));
            }
        }

        let mut groups: HashMap<Option<ChapterId>, Vec<(u32, ChapterId)>> = HashMap::new();
        for chapter in chapters.values() {
            if let Some(parent_id) = chapter.parent_id {
                if !chapters.contains_key(&parent_id) {
                    return Err(ScribeError::Persistence(format!(
                        "chapter {} references missing parent {}",
                        chapter.id, parent_id
                    )));
                }
            }
            groups
                .entry(chapter.parent_id)
                .or_default()
                .push((chapter.order, chapter.id));
        }

        let children = groups
            .into_iter()
            .map(|(parent, mut members)| {
                members.sort();
                (parent, members.into_iter().map(|(_, id)| id).collect())
            })
            .collect();

        let mut tree = Self {
            book_id,
            chapters,
            children,
        };

        if tree.preorder_ids().len() != tree.chapters.len() {
            return Err(ScribeError::Persistence(format!(
                "parent links of book {book_id} contain a cycle"
            )));
        }

        let parents: Vec<Option<ChapterId>> = tree.children.keys().copied().collect();
        for parent in parents {
            tree.renumber_group(parent);
        }
        for root in tree.child_ids(None).to_vec() {
            tree.relevel(root, 0);
        }

        Ok(tree)
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn get(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.get(&id)
    }

    /// Ordered child ids of `parent` (`None` for the root group).
    pub fn child_ids(&self, parent: Option<ChapterId>) -> &[ChapterId] {
        self.children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(NO_CHILDREN)
    }

    /// Ordered children of `parent`.
    pub fn children(&self, parent: Option<ChapterId>) -> Vec<&Chapter> {
        self.child_ids(parent)
            .iter()
            .filter_map(|id| self.chapters.get(id))
            .collect()
    }

    pub fn forest(&self) -> ChapterForest {
        ChapterForest::new(self.clone())
    }

    /// Append a chapter as the last sibling under its parent.
    pub fn insert(&mut self, new: NewChapter, max_level: Option<u32>) -> Result<Chapter> {
        let level = match new.parent_id {
            Some(parent_id) => self.require(parent_id)?.level + 1,
            None => 0,
        };
        check_level(level, max_level)?;

        let id = ChapterId::new();
        let siblings = self.children.entry(new.parent_id).or_default();
        let order = siblings.len() as u32;
        siblings.push(id);

        let chapter = Chapter {
            id,
            book_id: self.book_id,
            parent_id: new.parent_id,
            title: new.title,
            content: new.content,
            order,
            level,
        };
        self.chapters.insert(id, chapter.clone());

        Ok(chapter)
    }

    /// Move a chapter to `new_index` (clamped) under `new_parent`, carrying
    /// its subtree along.
    pub fn move_chapter(
        &mut self,
        id: ChapterId,
        new_parent: Option<ChapterId>,
        new_index: usize,
        max_level: Option<u32>,
    ) -> Result<Chapter> {
        let old_parent = self.require(id)?.parent_id;
        let new_level = match new_parent {
            Some(parent_id) => self.require(parent_id)?.level + 1,
            None => 0,
        };

        let cycle = ordering::would_create_cycle(id, new_parent, self.chapters.len(), |c| {
            self.chapters.get(&c).and_then(|chapter| chapter.parent_id)
        });
        if cycle {
            return Err(ScribeError::Cycle {
                chapter_id: id.to_string(),
                new_parent_id: new_parent.map_or_else(|| "root".to_string(), |p| p.to_string()),
            });
        }

        if let Some(max) = max_level {
            let height = ordering::subtree_height(id, |c| self.child_ids(Some(c)));
            check_level(new_level + height, Some(max))?;
        }

        if let Some(siblings) = self.children.get_mut(&old_parent) {
            ordering::detach(siblings, id);
        }
        self.renumber_group(old_parent);

        let target = self.children.entry(new_parent).or_default();
        ordering::attach(target, id, new_index);
        self.renumber_group(new_parent);

        if let Some(chapter) = self.chapters.get_mut(&id) {
            chapter.parent_id = new_parent;
        }
        self.relevel(id, new_level);
        self.prune_group(old_parent);

        self.require(id).cloned()
    }

    /// Delete a chapter. Returns the removed chapters (pre-order for cascade).
    pub fn delete(&mut self, id: ChapterId, strategy: DeleteStrategy) -> Result<Vec<Chapter>> {
        let (parent, level) = {
            let chapter = self.require(id)?;
            (chapter.parent_id, chapter.level)
        };

        let position = self
            .children
            .get_mut(&parent)
            .and_then(|siblings| ordering::detach(siblings, id))
            .unwrap_or(0);

        let removed = match strategy {
            DeleteStrategy::Cascade => {
                let doomed = ordering::subtree_levels(id, 0, |c| self.child_ids(Some(c)));
                let mut removed = Vec::with_capacity(doomed.len());
                for (doomed_id, _) in doomed {
                    self.children.remove(&Some(doomed_id));
                    if let Some(chapter) = self.chapters.remove(&doomed_id) {
                        removed.push(chapter);
                    }
                }
                removed
            }
            DeleteStrategy::PromoteChildren => {
                let promoted = self.children.remove(&Some(id)).unwrap_or_default();
                let siblings = self.children.entry(parent).or_default();
                ordering::splice_at(siblings, position, &promoted);

                for child in &promoted {
                    if let Some(chapter) = self.chapters.get_mut(child) {
                        chapter.parent_id = parent;
                    }
                }
                for child in &promoted {
                    self.relevel(*child, level);
                }

                self.chapters.remove(&id).into_iter().collect()
            }
        };

        self.renumber_group(parent);
        self.prune_group(parent);

        Ok(removed)
    }

    /// Change title and/or content; position fields are untouched.
    pub fn update(&mut self, id: ChapterId, update: ChapterUpdate) -> Result<Chapter> {
        let chapter = self
            .chapters
            .get_mut(&id)
            .ok_or_else(|| ScribeError::not_found("chapter", id))?;

        if let Some(title) = update.title {
            chapter.title = title;
        }
        if let Some(content) = update.content {
            chapter.content = content;
        }

        Ok(chapter.clone())
    }

    /// Rows that differ between `previous` and `self`.
    pub fn diff(&self, previous: &BookTree) -> ChangeSet {
        let mut upserts: Vec<Chapter> = self
            .chapters
            .values()
            .filter(|chapter| previous.chapters.get(&chapter.id) != Some(*chapter))
            .cloned()
            .collect();
        // parents before children for stores that enforce foreign keys
        upserts.sort_by_key(|chapter| (chapter.level, chapter.order));

        let removals = previous
            .chapters
            .keys()
            .filter(|id| !self.chapters.contains_key(id))
            .copied()
            .collect();

        ChangeSet { upserts, removals }
    }

    /// Verify the hierarchy invariants, describing the first violation.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut grouped = 0usize;

        for (parent, siblings) in &self.children {
            for (index, id) in siblings.iter().enumerate() {
                let chapter = self
                    .chapters
                    .get(id)
                    .ok_or_else(|| format!("group {parent:?} lists unknown chapter {id}"))?;

                if chapter.parent_id != *parent {
                    return Err(format!("chapter {id} listed under the wrong parent"));
                }
                if chapter.order as usize != index {
                    return Err(format!(
                        "chapter {id} has order {} at position {index}",
                        chapter.order
                    ));
                }
                if chapter.book_id != self.book_id {
                    return Err(format!("chapter {id} belongs to another book"));
                }

                let expected_level = match chapter.parent_id {
                    Some(parent_id) => {
                        let parent = self
                            .chapters
                            .get(&parent_id)
                            .ok_or_else(|| format!("chapter {id} has missing parent"))?;
                        parent.level + 1
                    }
                    None => 0,
                };
                if chapter.level != expected_level {
                    return Err(format!(
                        "chapter {id} has level {} but expected {expected_level}",
                        chapter.level
                    ));
                }
            }
            grouped += siblings.len();
        }

        if grouped != self.chapters.len() {
            return Err(format!(
                "{} chapters but {grouped} sibling entries",
                self.chapters.len()
            ));
        }

        let reachable: HashSet<ChapterId> = self.preorder_ids().into_iter().collect();
        if reachable.len() != self.chapters.len() {
            return Err("chapters unreachable from the roots (cycle)".to_string());
        }

        Ok(())
    }

    fn require(&self, id: ChapterId) -> Result<&Chapter> {
        self.chapters
            .get(&id)
            .ok_or_else(|| ScribeError::not_found("chapter", id))
    }

    fn preorder_ids(&self) -> Vec<ChapterId> {
        let mut visited = Vec::with_capacity(self.chapters.len());
        for root in self.child_ids(None) {
            visited.extend(
                ordering::subtree_levels(*root, 0, |c| self.child_ids(Some(c)))
                    .into_iter()
                    .map(|(id, _)| id)
                    .take(self.chapters.len() + 1),
            );
        }
        visited
    }

    fn renumber_group(&mut self, parent: Option<ChapterId>) {
        let Some(siblings) = self.children.get(&parent) else {
            return;
        };
        for (id, order) in ordering::renumber(siblings) {
            if let Some(chapter) = self.chapters.get_mut(&id) {
                chapter.order = order;
            }
        }
    }

    fn relevel(&mut self, root: ChapterId, level: u32) {
        let assignments = ordering::subtree_levels(root, level, |c| self.child_ids(Some(c)));
        for (id, level) in assignments {
            if let Some(chapter) = self.chapters.get_mut(&id) {
                chapter.level = level;
            }
        }
    }

    fn prune_group(&mut self, parent: Option<ChapterId>) {
        if self.children.get(&parent).is_some_and(Vec::is_empty) {
            self.children.remove(&parent);
        }
    }
}

fn check_level(level: u32, max_level: Option<u32>) -> Result<()> {
    match max_level {
        Some(max) if level > max => Err(ScribeError::InvalidInput(format!(
            "chapter nesting level {level} exceeds the maximum of {max}"
        ))),
        _ => Ok(()),
    }
}
