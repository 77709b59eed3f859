//! The catalog resolver: read-only joins over the synchronized caches.
//!
//! Every operation recomputes its result from the current cache contents.
//! Joins read multiple caches without a unifying lock, so results may
//! reflect a transient window between cache updates; resolution misses are
//! empty results, never errors.

use super::convert::{convert_service, health_probes, instance_id, probe_ports, workload_identity};
use super::{Controller, NODE_REGION_LABEL, NODE_ZONE_LABEL};
use crate::api::{
    ClusterClient, EndpointAddress, EndpointPortSpec, ObjectKey, ResourceObject, ServiceResource,
    WorkloadResource,
};
use crate::error::Error;
use crate::model::{
    Hostname, LabelSelection, NetworkEndpoint, Port, PortList, Probe, Service, ServiceInstance,
};
use std::{collections::BTreeSet, sync::Arc};

impl<C: ClusterClient> Controller<C> {
    /// Every known service in normalized form.
    ///
    /// Services with no resolvable translation are silently skipped.
    #[must_use]
    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services
            .store
            .state()
            .iter()
            .filter_map(|raw| convert_service(raw, &self.options.domain_suffix))
            .map(Arc::new)
            .collect()
    }

    /// Looks up one service by hostname.
    ///
    /// Returns `Ok(None)` when no such service is cached; only a hostname
    /// that cannot be interpreted at all is an error.
    pub fn get_service(&self, hostname: &Hostname) -> Result<Option<Arc<Service>>, Error> {
        let (name, namespace) = hostname.parse()?;
        let key = ObjectKey::new(name, namespace);
        Ok(self
            .service_by_key(&key)
            .as_deref()
            .and_then(|raw| convert_service(raw, &self.options.domain_suffix))
            .map(Arc::new))
    }

    fn service_by_key(&self, key: &ObjectKey) -> Option<Arc<ServiceResource>> {
        self.services.store.get(key)
    }

    /// The availability zone of a workload, through its owning node.
    ///
    /// `None` unless the node is cached and carries both placement labels;
    /// never a partial value.
    #[must_use]
    pub fn locality_of(&self, workload: &WorkloadResource) -> Option<String> {
        let key = ObjectKey::new(workload.node_name.as_str(), "");
        let Some(node) = self.nodes.store.get(&key) else {
            tracing::debug!(
                node = %workload.node_name,
                workload = %workload.name,
                "owning node not cached, locality unknown"
            );
            return None;
        };
        let region = node.labels.get(NODE_REGION_LABEL)?;
        let zone = node.labels.get(NODE_ZONE_LABEL)?;
        Some(format!("{region}/{zone}"))
    }

    /// Management ports of the workload at `address`; empty when the
    /// address is unknown.
    #[must_use]
    pub fn management_ports(&self, address: &str) -> PortList {
        self.workload_index
            .get(address)
            .map(|w| probe_ports(&w))
            .unwrap_or_default()
    }

    /// Declared health probes of the workload at `address`; empty when the
    /// address is unknown.
    #[must_use]
    pub fn health_check_info(&self, address: &str) -> Vec<Probe> {
        self.workload_index
            .get(address)
            .map(|w| health_probes(&w))
            .unwrap_or_default()
    }

    /// Resolves the instances implementing `hostname`, restricted to the
    /// requested service ports and label requirements.
    ///
    /// Ordering is subset order, then address order, then port order. An
    /// address appearing in multiple subsets yields one entry per subset;
    /// nothing is deduplicated here.
    pub fn instances(
        &self,
        hostname: &Hostname,
        ports: &[&str],
        selection: &LabelSelection,
    ) -> Result<Vec<ServiceInstance>, Error> {
        let (name, namespace) = hostname.parse()?;
        let key = ObjectKey::new(name, namespace);
        let Some(raw) = self.service_by_key(&key) else {
            return Ok(Vec::new());
        };
        let Some(service) = convert_service(&raw, &self.options.domain_suffix) else {
            return Ok(Vec::new());
        };
        let service = Arc::new(service);
        let requested: Vec<&Port> = ports
            .iter()
            .filter_map(|name| service.ports.get(name))
            .collect();

        let Some(group) = self.endpoint_groups.store.get(&key) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for subset in &group.subsets {
            for address in &subset.addresses {
                let labels = self
                    .workload_index
                    .labels(&address.address)
                    .unwrap_or_default();
                if !selection.matches(&labels) {
                    continue;
                }
                let workload = self.workload_index.get(&address.address);
                let availability_zone = workload.as_deref().and_then(|w| self.locality_of(w));
                let service_account = workload
                    .as_deref()
                    .filter(|w| !w.service_account.is_empty())
                    .map(|w| {
                        workload_identity(
                            &w.service_account,
                            &w.namespace,
                            &self.options.domain_suffix,
                        )
                    });
                let uid = workload.as_deref().map(instance_id);
                for port in &subset.ports {
                    let Some(service_port) = requested.iter().find(|sp| sp.name == port.name)
                    else {
                        continue;
                    };
                    out.push(ServiceInstance {
                        service: service.clone(),
                        endpoint: NetworkEndpoint {
                            address: address.address.clone(),
                            port: port.port,
                            service_port: (*service_port).clone(),
                            uid: uid.clone(),
                        },
                        labels: labels.clone(),
                        availability_zone: availability_zone.clone(),
                        service_account: service_account.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Resolves the instances co-located with `address`, across every
    /// endpoint group.
    ///
    /// Matches from the namespace of the workload at `address` sort
    /// strictly before matches from other namespaces: if the same
    /// address/port pair is reachable from two namespaces, a consumer
    /// taking the first occurrence prefers the same-namespace one and is
    /// expected to reject the duplicate itself.
    #[must_use]
    pub fn proxy_service_instances(&self, address: &str) -> Vec<ServiceInstance> {
        let target_namespace = self
            .workload_index
            .get(address)
            .map(|w| w.namespace.clone())
            .unwrap_or_default();
        let mut same_namespace = Vec::new();
        let mut other_namespace = Vec::new();
        for group in self.endpoint_groups.store.state() {
            let Some(raw) = self.service_by_key(&group.key()) else {
                continue;
            };
            let Some(service) = convert_service(&raw, &self.options.domain_suffix) else {
                continue;
            };
            let service = Arc::new(service);
            let bucket = if group.namespace == target_namespace {
                &mut same_namespace
            } else {
                &mut other_namespace
            };
            for subset in &group.subsets {
                for port in &subset.ports {
                    let Some(service_port) = service.ports.get(&port.name) else {
                        continue;
                    };
                    self.collect_colocated(&subset.addresses, address, port, service_port, &service, bucket);
                    self.collect_colocated(
                        &subset.not_ready_addresses,
                        address,
                        port,
                        service_port,
                        &service,
                        bucket,
                    );
                }
            }
        }
        if same_namespace.is_empty() && other_namespace.is_empty() {
            tracing::debug!(%address, "no service instances for proxy address");
        }
        same_namespace.extend(other_namespace);
        same_namespace
    }

    fn collect_colocated(
        &self,
        addresses: &[EndpointAddress],
        target: &str,
        port: &EndpointPortSpec,
        service_port: &Port,
        service: &Arc<Service>,
        out: &mut Vec<ServiceInstance>,
    ) {
        for address in addresses {
            if address.address != target {
                continue;
            }
            let workload = self.workload_index.get(target);
            let availability_zone = workload.as_deref().and_then(|w| self.locality_of(w));
            let service_account = workload
                .as_deref()
                .filter(|w| !w.service_account.is_empty())
                .map(|w| {
                    workload_identity(&w.service_account, &w.namespace, &self.options.domain_suffix)
                });
            out.push(ServiceInstance {
                service: service.clone(),
                endpoint: NetworkEndpoint {
                    address: address.address.clone(),
                    port: port.port,
                    service_port: service_port.clone(),
                    uid: None,
                },
                labels: self.workload_index.labels(target).unwrap_or_default(),
                availability_zone,
                service_account,
            });
        }
    }

    /// The identity set authorized to run `hostname`: accounts declared on
    /// the service resource plus the accounts of every resolved instance
    /// workload. Returned as a sorted set.
    #[must_use]
    pub fn service_accounts(&self, hostname: &Hostname, ports: &[&str]) -> Vec<String> {
        let Ok(Some(service)) = self.get_service(hostname) else {
            // The service may live in another registry; nothing to report.
            return Vec::new();
        };
        let mut accounts = BTreeSet::new();
        if let Ok(instances) = self.instances(hostname, ports, &LabelSelection::default()) {
            for instance in instances {
                if let Some(account) = instance.service_account {
                    accounts.insert(account);
                }
            }
        }
        for account in &service.service_accounts {
            accounts.insert(account.clone());
        }
        accounts.into_iter().collect()
    }
}
