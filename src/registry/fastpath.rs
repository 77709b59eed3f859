//! Low-latency endpoint propagation.
//!
//! When an [`EndpointSink`] is configured, endpoint-group changes skip the
//! serialized queue entirely: the watch session hands each change straight
//! to the [`EndpointPusher`], which joins it against the workload index and
//! pushes per-hostname endpoint lists. A join or push failure downgrades to
//! a full-resync request, so the sink never silently misses an endpoint.

use super::convert::{instance_id, workload_identity};
use super::workload::WorkloadIndex;
use super::SYSTEM_NAMESPACE;
use crate::api::{EndpointGroupResource, ServiceResource};
use crate::handler::{HandlerError, ResourceHandler};
use crate::model::{EventKind, Hostname, NormalizedEndpoint};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

/// Failure reported by [`EndpointSink::push_endpoints`].
#[derive(Debug, Error)]
#[error("endpoint push failed: {0}")]
pub struct PushError(pub String);

/// The low-latency endpoint consumer.
///
/// Push failures are downgraded to full-resync requests, never escalated;
/// implementations should treat `request_resync(true)` as an invitation to
/// rebuild their view through the query interface.
pub trait EndpointSink: Send + Sync {
    /// Replaces the endpoint list for `hostname`.
    fn push_endpoints(
        &self,
        cluster_id: &str,
        hostname: &Hostname,
        endpoints: Vec<NormalizedEndpoint>,
    ) -> Result<(), PushError>;

    /// Replaces the port-name to port-number mapping for `hostname`.
    fn push_service_ports(
        &self,
        cluster_id: &str,
        hostname: &Hostname,
        by_name: &HashMap<String, u16>,
        by_number: &HashMap<u16, String>,
    );

    /// Requests a catalog resync; `full` distinguishes a complete rebuild
    /// from an endpoints-only refresh.
    fn request_resync(&self, full: bool);
}

/// Joins endpoint-group changes against the workload index and pushes the
/// result to the configured sink.
pub(crate) struct EndpointPusher {
    pub(crate) cluster_id: String,
    pub(crate) domain_suffix: String,
    pub(crate) index: Arc<WorkloadIndex>,
    pub(crate) sink: Arc<dyn EndpointSink>,
}

impl EndpointPusher {
    /// Handles one endpoint-group change.
    ///
    /// A deleted group pushes an empty list: the hostname only disappears
    /// from the sink once the owning service is deleted.
    pub(crate) fn apply(&self, group: &EndpointGroupResource, event: EventKind) {
        if group.namespace == SYSTEM_NAMESPACE {
            return;
        }
        let hostname = Hostname::service(&group.name, &group.namespace, &self.domain_suffix);
        let endpoints = if event == EventKind::Delete {
            Vec::new()
        } else {
            self.collect(group, &hostname)
        };

        tracing::debug!(%hostname, count = endpoints.len(), "pushing endpoints");
        match self
            .sink
            .push_endpoints(&self.cluster_id, &hostname, endpoints)
        {
            Ok(()) => self.sink.request_resync(false),
            Err(err) => {
                tracing::warn!(%hostname, error = %err, "endpoint push failed, requesting full resync");
                self.sink.request_resync(true);
            }
        }
    }

    fn collect(&self, group: &EndpointGroupResource, hostname: &Hostname) -> Vec<NormalizedEndpoint> {
        let mut endpoints = Vec::new();
        for subset in &group.subsets {
            for address in &subset.addresses {
                let Some(workload) = self.index.get(&address.address) else {
                    // A partial join would silently omit a real endpoint;
                    // let the sink rebuild once the workload shows up.
                    tracing::warn!(
                        %hostname,
                        address = %address.address,
                        "endpoint address has no known workload, requesting full resync"
                    );
                    self.sink.request_resync(true);
                    continue;
                };
                for port in &subset.ports {
                    endpoints.push(NormalizedEndpoint {
                        address: address.address.clone(),
                        port: port.port,
                        service_port_name: port.name.clone(),
                        labels: workload.labels.clone(),
                        uid: instance_id(&workload),
                        service_account: workload_identity(
                            &workload.service_account,
                            &workload.namespace,
                            &self.domain_suffix,
                        ),
                    });
                }
            }
        }
        endpoints
    }

    /// Pushes the port-name mapping for a service and requests a full
    /// resync; the sink needs the numeric mapping before endpoint pushes
    /// make sense.
    pub(crate) fn push_service_ports(&self, svc: &ServiceResource) {
        let hostname = Hostname::service(&svc.name, &svc.namespace, &self.domain_suffix);
        let mut by_name = HashMap::new();
        let mut by_number = HashMap::new();
        for port in &svc.ports {
            by_name.insert(port.name.clone(), port.port);
            by_number.insert(port.port, port.name.clone());
        }
        self.sink
            .push_service_ports(&self.cluster_id, &hostname, &by_name, &by_number);
        self.sink.request_resync(true);
    }
}

/// Service-chain stage active on the fast path: keeps the sink's port map
/// current instead of running the generic translation.
pub(crate) struct PortMapStage {
    pub(crate) pusher: Arc<EndpointPusher>,
}

impl PortMapStage {
    fn handle(&self, svc: &ServiceResource) -> Result<(), HandlerError> {
        if svc.namespace == SYSTEM_NAMESPACE {
            return Ok(());
        }
        self.pusher.push_service_ports(svc);
        Ok(())
    }
}

impl ResourceHandler<ServiceResource> for PortMapStage {
    fn on_add(&self, object: &ServiceResource) -> Result<(), HandlerError> {
        self.handle(object)
    }

    fn on_update(&self, object: &ServiceResource) -> Result<(), HandlerError> {
        self.handle(object)
    }

    fn on_delete(&self, object: &ServiceResource) -> Result<(), HandlerError> {
        self.handle(object)
    }
}

#[cfg(test)]
mod tests {
    use super::{EndpointPusher, EndpointSink, PushError};
    use crate::api::{
        EndpointAddress, EndpointGroupResource, EndpointPortSpec, EndpointSubset, ServicePortSpec,
        ServiceResource, WorkloadResource,
    };
    use crate::handler::ResourceHandler;
    use crate::model::{EventKind, Hostname, NormalizedEndpoint};
    use crate::registry::workload::WorkloadIndex;
    use parking_lot::Mutex;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    #[derive(Default)]
    struct RecordingSink {
        pushes: Mutex<Vec<(Hostname, Vec<NormalizedEndpoint>)>>,
        port_maps: Mutex<Vec<(Hostname, HashMap<String, u16>)>>,
        resyncs: Mutex<Vec<bool>>,
        fail_push: AtomicBool,
    }

    impl EndpointSink for RecordingSink {
        fn push_endpoints(
            &self,
            _cluster_id: &str,
            hostname: &Hostname,
            endpoints: Vec<NormalizedEndpoint>,
        ) -> Result<(), PushError> {
            if self.fail_push.load(Ordering::SeqCst) {
                return Err(PushError("sink unavailable".to_string()));
            }
            self.pushes.lock().push((hostname.clone(), endpoints));
            Ok(())
        }

        fn push_service_ports(
            &self,
            _cluster_id: &str,
            hostname: &Hostname,
            by_name: &HashMap<String, u16>,
            _by_number: &HashMap<u16, String>,
        ) {
            self.port_maps.lock().push((hostname.clone(), by_name.clone()));
        }

        fn request_resync(&self, full: bool) {
            self.resyncs.lock().push(full);
        }
    }

    fn pusher(sink: Arc<RecordingSink>) -> (EndpointPusher, Arc<WorkloadIndex>) {
        let index = Arc::new(WorkloadIndex::default());
        let pusher = EndpointPusher {
            cluster_id: "main".to_string(),
            domain_suffix: "cluster.local".to_string(),
            index: index.clone(),
            sink,
        };
        (pusher, index)
    }

    fn workload(name: &str, address: &str) -> WorkloadResource {
        WorkloadResource {
            name: name.to_string(),
            namespace: "default".to_string(),
            address: address.to_string(),
            service_account: "runner".to_string(),
            ..WorkloadResource::default()
        }
    }

    fn group(addresses: &[&str]) -> EndpointGroupResource {
        EndpointGroupResource {
            name: "api".to_string(),
            namespace: "default".to_string(),
            subsets: vec![EndpointSubset {
                addresses: addresses
                    .iter()
                    .map(|a| EndpointAddress {
                        address: (*a).to_string(),
                    })
                    .collect(),
                not_ready_addresses: Vec::new(),
                ports: vec![EndpointPortSpec {
                    name: "http".to_string(),
                    port: 8080,
                }],
            }],
            ..EndpointGroupResource::default()
        }
    }

    #[test]
    fn resolvable_addresses_are_all_pushed() {
        let sink = Arc::new(RecordingSink::default());
        let (pusher, index) = pusher(sink.clone());
        index.on_add(&workload("a", "10.0.0.1")).unwrap();
        index.on_add(&workload("b", "10.0.0.2")).unwrap();

        pusher.apply(&group(&["10.0.0.1", "10.0.0.2"]), EventKind::Update);

        let pushes = sink.pushes.lock();
        let (hostname, endpoints) = &pushes[0];
        assert_eq!(hostname.as_str(), "api.default.svc.cluster.local");
        // No address is silently dropped.
        let addresses: Vec<_> = endpoints.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(endpoints[0].port, 8080);
        assert_eq!(endpoints[0].service_port_name, "http");
        assert_eq!(endpoints[0].uid, "kubernetes://a.default");
        assert_eq!(
            endpoints[0].service_account,
            "spiffe://cluster.local/ns/default/sa/runner"
        );
        assert_eq!(*sink.resyncs.lock(), vec![false]);
    }

    #[test]
    fn unknown_address_requests_full_resync_and_is_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let (pusher, index) = pusher(sink.clone());
        index.on_add(&workload("a", "10.0.0.1")).unwrap();

        pusher.apply(&group(&["10.0.0.1", "10.0.0.9"]), EventKind::Add);

        let pushes = sink.pushes.lock();
        assert_eq!(pushes[0].1.len(), 1);
        assert_eq!(pushes[0].1[0].address, "10.0.0.1");
        // Full resync for the miss, incremental after the successful push.
        assert_eq!(*sink.resyncs.lock(), vec![true, false]);
    }

    #[test]
    fn push_failure_downgrades_to_full_resync() {
        let sink = Arc::new(RecordingSink::default());
        let (pusher, index) = pusher(sink.clone());
        index.on_add(&workload("a", "10.0.0.1")).unwrap();
        sink.fail_push.store(true, Ordering::SeqCst);

        pusher.apply(&group(&["10.0.0.1"]), EventKind::Update);

        assert!(sink.pushes.lock().is_empty());
        assert_eq!(*sink.resyncs.lock(), vec![true]);
    }

    #[test]
    fn deleted_group_pushes_an_empty_list() {
        let sink = Arc::new(RecordingSink::default());
        let (pusher, index) = pusher(sink.clone());
        index.on_add(&workload("a", "10.0.0.1")).unwrap();

        pusher.apply(&group(&["10.0.0.1"]), EventKind::Delete);

        let pushes = sink.pushes.lock();
        assert!(pushes[0].1.is_empty());
        assert_eq!(*sink.resyncs.lock(), vec![false]);
    }

    #[test]
    fn system_namespace_is_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let (pusher, _) = pusher(sink.clone());
        let mut system = group(&["10.0.0.1"]);
        system.namespace = "kube-system".to_string();

        pusher.apply(&system, EventKind::Add);

        assert!(sink.pushes.lock().is_empty());
        assert!(sink.resyncs.lock().is_empty());
    }

    #[test]
    fn service_change_pushes_port_map_and_full_resync() {
        let sink = Arc::new(RecordingSink::default());
        let (pusher, _) = pusher(sink.clone());
        let svc = ServiceResource {
            name: "api".to_string(),
            namespace: "default".to_string(),
            ports: vec![
                ServicePortSpec {
                    name: "http".to_string(),
                    port: 80,
                    protocol: "TCP".to_string(),
                },
                ServicePortSpec {
                    name: "grpc".to_string(),
                    port: 8080,
                    protocol: "TCP".to_string(),
                },
            ],
            ..ServiceResource::default()
        };

        pusher.push_service_ports(&svc);

        let maps = sink.port_maps.lock();
        assert_eq!(maps[0].0.as_str(), "api.default.svc.cluster.local");
        assert_eq!(maps[0].1.get("http"), Some(&80));
        assert_eq!(maps[0].1.get("grpc"), Some(&8080));
        assert_eq!(*sink.resyncs.lock(), vec![true]);
    }
}
