//! Conversions from raw resources to the normalized model.

use crate::api::{ProbePort, ServiceResource, WorkloadResource};
use crate::model::{Hostname, Port, PortList, Probe, Protocol, Service};

/// Translates a raw service into the normalized model.
///
/// Returns `None` when the resource cannot be keyed (empty name or
/// namespace); such services are silently skipped by the catalog.
pub(crate) fn convert_service(svc: &ServiceResource, domain_suffix: &str) -> Option<Service> {
    if svc.name.is_empty() || svc.namespace.is_empty() {
        return None;
    }
    let ports = svc
        .ports
        .iter()
        .map(|p| Port {
            name: p.name.clone(),
            port: p.port,
            protocol: Protocol::infer(&p.protocol, &p.name),
        })
        .collect();
    Some(Service {
        hostname: Hostname::service(&svc.name, &svc.namespace, domain_suffix),
        address: svc.cluster_address.clone().filter(|a| !a.is_empty()),
        ports,
        service_accounts: svc.declared_accounts.clone(),
    })
}

/// SPIFFE-style identity for a workload service account.
pub(crate) fn workload_identity(
    service_account: &str,
    namespace: &str,
    domain_suffix: &str,
) -> String {
    format!("spiffe://{domain_suffix}/ns/{namespace}/sa/{service_account}")
}

/// Opaque id of a workload instance.
pub(crate) fn instance_id(workload: &WorkloadResource) -> String {
    format!("kubernetes://{}.{}", workload.name, workload.namespace)
}

fn resolve_probe_port(workload: &WorkloadResource, port: &ProbePort) -> Option<u16> {
    match port {
        ProbePort::Number(number) => Some(*number),
        ProbePort::Name(name) => {
            let number = workload
                .container_ports
                .iter()
                .find(|p| &p.name == name)
                .map(|p| p.port);
            if number.is_none() {
                tracing::debug!(
                    workload = %workload.name,
                    port = %name,
                    "probe references an undeclared container port"
                );
            }
            number
        }
    }
}

/// Management ports derived from the declared probes.
///
/// Named probe ports that match no declared container port are skipped,
/// yielding a partial list.
pub(crate) fn probe_ports(workload: &WorkloadResource) -> PortList {
    let mut ports: Vec<Port> = Vec::new();
    for probe in &workload.probes {
        let Some(number) = resolve_probe_port(workload, &probe.port) else {
            continue;
        };
        if ports.iter().any(|p| p.port == number) {
            continue;
        }
        ports.push(Port {
            name: format!("mgmt-{number}"),
            port: number,
            protocol: Protocol::Http,
        });
    }
    ports.into()
}

/// The declared health probes of a workload, with named ports resolved.
///
/// An unresolvable port leaves the probe in place with no port, so callers
/// still see the path.
pub(crate) fn health_probes(workload: &WorkloadResource) -> Vec<Probe> {
    workload
        .probes
        .iter()
        .map(|probe| Probe {
            port: resolve_probe_port(workload, &probe.port),
            path: probe.path.clone(),
        })
        .collect()
}
