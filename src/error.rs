//! Error types for the Scribe core.
//!
//! Every fallible operation in the crate returns [`ScribeError`]. Component
//! level errors (state machine, builder, configuration, persistence) convert
//! into it so callers only ever match on one taxonomy.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::persistence::PersistenceError;
use crate::publish::builder::BuilderError;
use crate::state_machine::StateMachineError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScribeError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot move chapter {chapter_id} under {new_parent_id}: would create a cycle")]
    Cycle {
        chapter_id: String,
        new_parent_id: String,
    },

    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Builder unavailable: {0}")]
    BuilderUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Concurrent modification of book {book_id}: expected version {expected}, found {actual}")]
    Conflict {
        book_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ScribeError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code handed to the web layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Cycle { .. } => "cycle_error",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::BuilderUnavailable(_) => "builder_unavailable",
            Self::InvalidInput(_) => "invalid_input",
            Self::Timeout(_) => "timeout",
            Self::Conflict { .. } => "conflict_error",
            Self::Configuration(_) => "configuration_error",
            Self::Persistence(_) => "persistence_error",
        }
    }
}

impl From<StateMachineError> for ScribeError {
    fn from(error: StateMachineError) -> Self {
        match error {
            StateMachineError::InvalidTransition { from, event } => {
                Self::InvalidTransition { from, event }
            }
        }
    }
}

impl From<BuilderError> for ScribeError {
    fn from(error: BuilderError) -> Self {
        match error {
            BuilderError::Unavailable(reason) => Self::BuilderUnavailable(reason),
            BuilderError::InvalidInput(reason) => Self::InvalidInput(reason),
            BuilderError::NotCancelable(reason) => {
                Self::InvalidInput(format!("build not cancelable: {reason}"))
            }
        }
    }
}

impl From<ConfigurationError> for ScribeError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<PersistenceError> for ScribeError {
    fn from(error: PersistenceError) -> Self {
        match error {
            PersistenceError::VersionConflict {
                book_id,
                expected,
                actual,
            } => Self::Conflict {
                book_id: book_id.to_string(),
                expected,
                actual,
            },
            PersistenceError::BookNotFound(book_id) => Self::not_found("book", book_id),
            PersistenceError::BookExists(book_id) => {
                Self::InvalidInput(format!("book {book_id} already exists"))
            }
            PersistenceError::Backend(reason) => Self::Persistence(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;
