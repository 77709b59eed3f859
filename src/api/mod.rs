//! The consumed cluster API.
//!
//! The remote API client is an external collaborator: this module only
//! fixes the contract the synchronizer depends on, a `list` returning a
//! snapshot plus a version token and a `watch` resuming from a token.
//! Transport, encoding and authentication live behind [`ResourceApi`]
//! implementations.

mod resources;

pub use resources::{
    EndpointAddress, EndpointGroupResource, EndpointPortSpec, EndpointSubset, NamedPort,
    NodeResource, ProbePort, ProbeSpec, ServicePortSpec, ServiceResource, WorkloadResource,
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced by the remote API client.
///
/// These are always recoverable from the synchronizer's point of view; the
/// watch loop re-lists or re-watches and never surfaces them to consumers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("watch stream failed: {0}")]
    Stream(String),
}

/// The watched resource kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Service,
    EndpointGroup,
    Node,
    Workload,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Service => "service",
            ResourceKind::EndpointGroup => "endpoint-group",
            ResourceKind::Node => "node",
            ResourceKind::Workload => "workload",
        })
    }
}

/// Identity of an object within its resource kind.
///
/// Cluster-scoped kinds use an empty namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub name: String,
    pub namespace: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Key extraction and kind tagging for watched resources.
pub trait ResourceObject: Clone + PartialEq + Send + Sync + fmt::Debug + 'static {
    const KIND: ResourceKind;

    fn name(&self) -> &str;

    /// Empty for cluster-scoped kinds.
    fn namespace(&self) -> &str;

    /// The version token carried by the object, used to advance the watch
    /// position as events arrive.
    fn resource_version(&self) -> Option<&str>;

    fn key(&self) -> ObjectKey {
        ObjectKey::new(self.name(), self.namespace())
    }
}

/// Raw change notification from the remote watch stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    /// The version token the watch resumed from has been compacted away;
    /// the consumer must list again.
    Expired,
}

/// A list snapshot plus the version token to watch from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectList<K> {
    pub items: Vec<K>,
    pub version: String,
}

/// Server-side filter applied to list and watch calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Restrict to one namespace; `None` watches all namespaces.
    pub namespace: Option<String>,
}

impl ListFilter {
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }
}

/// List and watch access to one resource kind.
#[async_trait]
pub trait ResourceApi<K: ResourceObject>: Send + Sync {
    async fn list(&self, filter: &ListFilter) -> Result<ObjectList<K>, ApiError>;

    async fn watch(
        &self,
        filter: &ListFilter,
        version: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent<K>, ApiError>>, ApiError>;
}

/// A cluster API client able to serve every watched resource kind.
pub trait ClusterClient:
    ResourceApi<ServiceResource>
    + ResourceApi<EndpointGroupResource>
    + ResourceApi<NodeResource>
    + ResourceApi<WorkloadResource>
    + 'static
{
}

impl<T> ClusterClient for T where
    T: ResourceApi<ServiceResource>
        + ResourceApi<EndpointGroupResource>
        + ResourceApi<NodeResource>
        + ResourceApi<WorkloadResource>
        + 'static
{
}
