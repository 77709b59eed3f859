//! Synchronizes cluster state into a queryable service catalog.
//!
//! This crate watches a dynamic set of cluster resources — services,
//! endpoint groups, nodes and workload instances — and maintains an
//! eventually-consistent, in-memory model of which network endpoints
//! implement which service, with what identity and locality metadata.
//! Consumers are data-plane control systems that need a normalized
//! service/instance view to compute routing configuration.
//!
//! The building blocks compose bottom-up:
//!
//! - [`watcher()`](crate::watcher::watcher): a resilient list-then-watch
//!   stream per resource kind, re-listing automatically when the remote
//!   watch desyncs.
//! - [`Store`]: a concurrently readable cache fed by one watch session,
//!   deriving Add/Update/Delete changes and suppressing no-op updates.
//! - [`queue`] and [`handler`]: a single serialized worker draining all
//!   change events in arrival order through per-kind handler chains, with
//!   retry on failure.
//! - [`registry::Controller`]: ties the four caches together, answers
//!   catalog queries by joining them on demand, and optionally pushes
//!   endpoint changes straight to a low-latency consumer.
//!
//! The cluster transport is injected through [`api::ResourceApi`]; this
//! crate owns no wire format and persists nothing — the whole model is
//! rebuilt from a fresh list on startup.

pub mod api;
mod error;
pub mod handler;
pub mod model;
pub mod observe;
pub mod queue;
pub mod registry;
pub mod store;
pub mod watcher;

pub use crate::error::Error;
pub use crate::registry::{Controller, EndpointSink, Options, PushError};
pub use crate::store::{store, Store};
pub use crate::watcher::watcher;
