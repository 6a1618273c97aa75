//! # Domain Models
//!
//! Plain data records for chapters and publish jobs. These carry no behavior
//! beyond construction helpers; the tree store and job registry own every
//! mutation.

pub mod chapter;
pub mod publish_job;

pub use chapter::{Chapter, ChapterUpdate, NewChapter};
pub use publish_job::{JobReceipt, PublishFormat, PublishJob};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a book; every chapter and job is scoped to one.
    BookId
);
uuid_id!(
    /// Identifier of a chapter within the arena of its book.
    ChapterId
);
uuid_id!(
    /// Identifier of a publish job.
    JobId
);
