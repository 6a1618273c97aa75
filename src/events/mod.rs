//! # Lifecycle Events
//!
//! Broadcast notifications for tree mutations and job transitions. Nothing
//! in the core depends on anyone listening; subscribers (a websocket fan-out,
//! an audit log, tests) attach through [`EventPublisher::subscribe`].

pub mod publisher;

pub use publisher::{EventPublisher, LifecycleEvent, PublishedEvent};
