//! The normalized service-catalog model.
//!
//! Everything in this module is derived on demand from the raw resource
//! caches and owned by the caller; nothing here is shared mutable state.

mod hostname;
mod instance;
mod labels;
mod port;
mod service;

pub use hostname::Hostname;
pub use instance::{NetworkEndpoint, NormalizedEndpoint, Probe, ServiceInstance};
pub use labels::{LabelSelection, Labels};
pub use port::{Port, PortList, Protocol};
pub use service::Service;

use std::fmt;

/// The kind of change delivered to registered handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Add => "add",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        })
    }
}
