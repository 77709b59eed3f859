//! Raw watched resource types, mirroring the remote collections 1:1.

use super::{ResourceKind, ResourceObject};
use crate::model::Labels;
use serde::{Deserialize, Serialize};

/// A service resource as served by the cluster API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceResource {
    pub name: String,
    pub namespace: String,
    pub resource_version: Option<String>,
    /// The assigned virtual address, empty for headless services.
    pub cluster_address: Option<String>,
    pub ports: Vec<ServicePortSpec>,
    /// Identities declared by operators for out-of-cluster workloads.
    pub declared_accounts: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicePortSpec {
    pub name: String,
    pub port: u16,
    /// Declared transport protocol, e.g. `TCP` or `UDP`.
    pub protocol: String,
}

impl ResourceObject for ServiceResource {
    const KIND: ResourceKind = ResourceKind::Service;

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }
}

/// The endpoint group implementing a same-named service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointGroupResource {
    pub name: String,
    pub namespace: String,
    pub resource_version: Option<String>,
    pub subsets: Vec<EndpointSubset>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSubset {
    pub addresses: Vec<EndpointAddress>,
    pub not_ready_addresses: Vec<EndpointAddress>,
    pub ports: Vec<EndpointPortSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointAddress {
    pub address: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointPortSpec {
    /// Matches the service port name.
    pub name: String,
    pub port: u16,
}

impl ResourceObject for EndpointGroupResource {
    const KIND: ResourceKind = ResourceKind::EndpointGroup;

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }
}

/// A compute node; cluster-scoped, consulted only for placement labels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeResource {
    pub name: String,
    pub resource_version: Option<String>,
    pub labels: Labels,
}

impl ResourceObject for NodeResource {
    const KIND: ResourceKind = ResourceKind::Node;

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        ""
    }

    fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }
}

/// A single running workload unit with its own network address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadResource {
    pub name: String,
    pub namespace: String,
    pub resource_version: Option<String>,
    /// The instance network address; empty until one is assigned.
    pub address: String,
    /// The node the instance was scheduled onto; assigned late.
    pub node_name: String,
    pub service_account: String,
    pub labels: Labels,
    /// Declared named container ports, used to resolve named probe ports.
    pub container_ports: Vec<NamedPort>,
    pub probes: Vec<ProbeSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NamedPort {
    pub name: String,
    pub port: u16,
}

/// A declared HTTP health probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSpec {
    pub port: ProbePort,
    pub path: String,
}

/// Probe target port, by number or by container-port name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbePort {
    Number(u16),
    Name(String),
}

impl ResourceObject for WorkloadResource {
    const KIND: ResourceKind = ResourceKind::Workload;

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn resource_version(&self) -> Option<&str> {
        self.resource_version.as_deref()
    }
}
