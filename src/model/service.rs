use super::{Hostname, PortList};
use serde::{Deserialize, Serialize};

/// A named, stable network identity fronting a set of instances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub hostname: Hostname,
    /// The virtual address of the service, when one is assigned.
    pub address: Option<String>,
    pub ports: PortList,
    /// Identities declared directly on the service resource, for workloads
    /// that run outside the cluster and are not discoverable through
    /// instance resolution.
    pub service_accounts: Vec<String>,
}
