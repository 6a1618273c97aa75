use serde::{Deserialize, Serialize};

use super::{BookId, ChapterId};

/// One node of a book's chapter hierarchy.
///
/// `order` is the zero-based position among siblings sharing the same
/// `parent_id`; `level` is the depth below the root (root chapters are 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub book_id: BookId,
    pub parent_id: Option<ChapterId>,
    pub title: String,
    pub content: String,
    pub order: u32,
    pub level: u32,
}

impl Chapter {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for inserting a chapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewChapter {
    pub parent_id: Option<ChapterId>,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl NewChapter {
    pub fn new(parent_id: Option<ChapterId>, title: impl Into<String>) -> Self {
        Self {
            parent_id,
            title: title.into(),
            content: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

/// Text-only edit of an existing chapter. Position fields are never touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl ChapterUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}
