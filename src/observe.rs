//! Observability seam for registry events.
//!
//! The embedding process owns metric registration and export; this module
//! only defines the counter interface the registry reports into.

use crate::api::ResourceKind;
use crate::model::EventKind;
use std::fmt;

/// Outcome of one observed cache or queue event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Add,
    Update,
    /// An update suppressed because the object was unchanged.
    UpdateSame,
    Delete,
    /// A failed task was re-queued.
    Retry,
    /// A failed task was dropped after exhausting its retry budget.
    Exhausted,
}

impl From<EventKind> for Outcome {
    fn from(event: EventKind) -> Self {
        match event {
            EventKind::Add => Outcome::Add,
            EventKind::Update => Outcome::Update,
            EventKind::Delete => Outcome::Delete,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Add => "add",
            Outcome::Update => "update",
            Outcome::UpdateSame => "updateSame",
            Outcome::Delete => "delete",
            Outcome::Retry => "retry",
            Outcome::Exhausted => "exhausted",
        })
    }
}

/// Counter for registry events, injected by the embedding process.
///
/// Called inline with event processing, so implementations must be cheap
/// and non-blocking.
pub trait EventObserver: Send + Sync {
    fn event(&self, kind: ResourceKind, outcome: Outcome);
}

/// Discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl EventObserver for NoopObserver {
    fn event(&self, _kind: ResourceKind, _outcome: Outcome) {}
}
