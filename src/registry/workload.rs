//! Reverse index from instance network address to workload identity.

use crate::api::WorkloadResource;
use crate::handler::{HandlerError, ResourceHandler};
use crate::model::Labels;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Secondary index over the workload cache, keyed by network address.
///
/// Runs as a stage on the workload handler chain so it is rebuilt on every
/// instance Add/Update/Delete and stays consistent with the cache. Lookup
/// misses are a normal outcome: endpoint groups may reference instances
/// this registry has not observed yet, and every caller must degrade to a
/// partial result instead of failing.
#[derive(Debug, Default)]
pub struct WorkloadIndex {
    by_address: RwLock<AHashMap<String, Arc<WorkloadResource>>>,
}

impl WorkloadIndex {
    /// The workload listening at `address`, when known.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<Arc<WorkloadResource>> {
        self.by_address.read().get(address).cloned()
    }

    /// Labels of the workload at `address`, when known.
    #[must_use]
    pub fn labels(&self, address: &str) -> Option<Labels> {
        self.by_address.read().get(address).map(|w| w.labels.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_address.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_address.read().is_empty()
    }

    fn upsert(&self, workload: &WorkloadResource) {
        // The address is assigned late; index the instance once it has one.
        if workload.address.is_empty() {
            return;
        }
        self.by_address
            .write()
            .insert(workload.address.clone(), Arc::new(workload.clone()));
    }

    fn remove(&self, workload: &WorkloadResource) {
        if workload.address.is_empty() {
            return;
        }
        self.by_address.write().remove(&workload.address);
    }
}

impl ResourceHandler<WorkloadResource> for WorkloadIndex {
    fn on_add(&self, object: &WorkloadResource) -> Result<(), HandlerError> {
        self.upsert(object);
        Ok(())
    }

    fn on_update(&self, object: &WorkloadResource) -> Result<(), HandlerError> {
        self.upsert(object);
        Ok(())
    }

    fn on_delete(&self, object: &WorkloadResource) -> Result<(), HandlerError> {
        self.remove(object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::WorkloadIndex;
    use crate::api::WorkloadResource;
    use crate::handler::ResourceHandler;
    use crate::model::Labels;

    fn workload(name: &str, address: &str) -> WorkloadResource {
        WorkloadResource {
            name: name.to_string(),
            namespace: "default".to_string(),
            address: address.to_string(),
            labels: [("app", name)].into_iter().collect::<Labels>(),
            ..WorkloadResource::default()
        }
    }

    #[test]
    fn indexes_by_address() {
        let index = WorkloadIndex::default();
        index.on_add(&workload("a", "10.0.0.1")).unwrap();

        assert_eq!(index.get("10.0.0.1").unwrap().name, "a");
        assert_eq!(
            index.labels("10.0.0.1").unwrap(),
            [("app", "a")].into_iter().collect::<Labels>()
        );
        assert!(index.get("10.0.0.2").is_none());
    }

    #[test]
    fn update_replaces_and_delete_removes() {
        let index = WorkloadIndex::default();
        index.on_add(&workload("a", "10.0.0.1")).unwrap();
        index.on_update(&workload("b", "10.0.0.1")).unwrap();
        assert_eq!(index.get("10.0.0.1").unwrap().name, "b");

        index.on_delete(&workload("b", "10.0.0.1")).unwrap();
        assert!(index.get("10.0.0.1").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn addressless_instances_are_ignored() {
        let index = WorkloadIndex::default();
        index.on_add(&workload("pending", "")).unwrap();
        assert!(index.is_empty());
    }
}
