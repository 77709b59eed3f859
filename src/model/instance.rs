use super::{Labels, Port, Service};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The concrete network address backing one service port.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkEndpoint {
    pub address: String,
    /// The port the workload actually listens on.
    pub port: u16,
    /// The service port this endpoint implements.
    pub service_port: Port,
    /// Opaque identifier of the backing workload, when known.
    pub uid: Option<String>,
}

/// One (endpoint, service) pair produced by an instance query.
///
/// Instances are computed on demand by joining the service, endpoint-group
/// and workload caches; they are never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInstance {
    pub service: Arc<Service>,
    pub endpoint: NetworkEndpoint,
    pub labels: Labels,
    /// `"<region>/<zone>"` placement, when the owning node carries both
    /// labels. Never a partial value.
    pub availability_zone: Option<String>,
    pub service_account: Option<String>,
}

/// The unit pushed to the low-latency endpoint sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEndpoint {
    pub address: String,
    pub port: u16,
    /// Name of the service port this endpoint implements; the sink maps it
    /// to a number through the pushed service port map.
    pub service_port_name: String,
    pub labels: Labels,
    pub uid: String,
    pub service_account: String,
}

/// A declared health-check endpoint on a workload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub port: Option<u16>,
    pub path: String,
}
