//! # Chapter Tree
//!
//! The ordered, multi-level chapter hierarchy of each book.
//!
//! - [`ordering`] - pure sibling-list and level algorithms
//! - [`book_tree`] - arena holding one book's chapters
//! - [`snapshot`] - immutable pre-order forest views
//! - [`store`] - per-book serialized access with write-through persistence

pub mod book_tree;
pub mod ordering;
pub mod snapshot;
pub mod store;

pub use book_tree::{BookTree, DeleteStrategy};
pub use snapshot::{ChapterForest, ChapterNode, PreOrder};
pub use store::TreeStore;
