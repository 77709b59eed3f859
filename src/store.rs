//! Per-kind object cache with a single writer and concurrent readers.

use crate::api::{ObjectKey, ResourceObject};
use crate::model::EventKind;
use crate::watcher::Event;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

type Shared<K> = Arc<RwLock<AHashMap<ObjectKey, Arc<K>>>>;

/// A logical cache mutation derived from one watcher event.
///
/// The raw stream only distinguishes applied/deleted/restarted; the writer
/// refines that into the Add/Update/Delete vocabulary consumers see, based
/// on what was cached before.
#[derive(Clone, Debug)]
pub enum Change<K> {
    Added(Arc<K>),
    Updated(Arc<K>),
    /// An update that left the object deep-equal to the cached copy.
    /// Suppressed downstream (periodic full resyncs would otherwise fan
    /// out as spurious updates), but still counted.
    Unchanged(Arc<K>),
    Deleted(Arc<K>),
}

impl<K> Change<K> {
    /// The event to deliver downstream; `None` for suppressed updates.
    #[must_use]
    pub fn event(&self) -> Option<EventKind> {
        match self {
            Change::Added(_) => Some(EventKind::Add),
            Change::Updated(_) => Some(EventKind::Update),
            Change::Unchanged(_) => None,
            Change::Deleted(_) => Some(EventKind::Delete),
        }
    }

    #[must_use]
    pub fn object(&self) -> &Arc<K> {
        match self {
            Change::Added(obj) | Change::Updated(obj) | Change::Unchanged(obj) | Change::Deleted(obj) => {
                obj
            }
        }
    }
}

/// The writable half of a cache.
///
/// Exclusive: exactly one synchronization loop may apply events, since a
/// `Restarted` snapshot clobbers the whole map.
#[derive(Debug)]
pub struct Writer<K: ResourceObject> {
    store: Shared<K>,
}

impl<K: ResourceObject> Default for Writer<K> {
    fn default() -> Self {
        Self {
            store: Arc::default(),
        }
    }
}

impl<K: ResourceObject> Writer<K> {
    /// Returns a read handle to the store.
    ///
    /// Any number of read handles may be obtained, by calling `as_reader`
    /// repeatedly or by cloning a [`Store`].
    #[must_use]
    pub fn as_reader(&self) -> Store<K> {
        Store {
            store: self.store.clone(),
        }
    }

    /// Applies a single watcher event to the store, returning the logical
    /// changes it produced.
    ///
    /// A re-listed snapshot is diffed against the cached state: objects
    /// not seen before come back as `Added`, changed objects as `Updated`,
    /// unchanged ones as `Unchanged` and objects missing from the snapshot
    /// as `Deleted`.
    pub fn apply(&mut self, event: Event<K>) -> Vec<Change<K>> {
        match event {
            Event::Applied(obj) => {
                let obj = Arc::new(obj);
                let key = obj.key();
                let prev = self.store.write().insert(key, obj.clone());
                let change = match prev {
                    Some(prev) if *prev == *obj => Change::Unchanged(obj),
                    Some(_) => Change::Updated(obj),
                    None => Change::Added(obj),
                };
                vec![change]
            }
            Event::Deleted(obj) => {
                let obj = Arc::new(obj);
                self.store.write().remove(&obj.key());
                vec![Change::Deleted(obj)]
            }
            Event::Restarted(objs) => {
                let mut changes = Vec::with_capacity(objs.len());
                let mut next = AHashMap::with_capacity(objs.len());
                let mut store = self.store.write();
                let mut prev = std::mem::take(&mut *store);
                for obj in objs {
                    let obj = Arc::new(obj);
                    let key = obj.key();
                    match prev.remove(&key) {
                        None => changes.push(Change::Added(obj.clone())),
                        Some(old) if *old == *obj => changes.push(Change::Unchanged(obj.clone())),
                        Some(_) => changes.push(Change::Updated(obj.clone())),
                    }
                    next.insert(key, obj);
                }
                changes.extend(prev.into_values().map(Change::Deleted));
                *store = next;
                changes
            }
        }
    }
}

/// A readable cache of watched objects of kind `K`.
///
/// Cloning produces a new reference to the same backing store. The cache
/// may lag slightly behind the remote collection; queries must treat
/// missing objects as a normal outcome.
#[derive(Debug)]
pub struct Store<K: ResourceObject> {
    store: Shared<K>,
}

impl<K: ResourceObject> Clone for Store<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K: ResourceObject> Store<K> {
    /// Retrieves the entry for `key`, if cached.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.store.read().get(key).cloned()
    }

    /// A full snapshot of the current values. Order is unspecified.
    #[must_use]
    pub fn state(&self) -> Vec<Arc<K>> {
        self.store.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

/// Creates a fresh `(reader, writer)` cache pair.
#[must_use]
pub fn store<K: ResourceObject>() -> (Store<K>, Writer<K>) {
    let writer = Writer::default();
    let reader = writer.as_reader();
    (reader, writer)
}

#[cfg(test)]
mod tests {
    use super::{store, Change};
    use crate::api::{NodeResource, ObjectKey};
    use crate::model::Labels;
    use crate::watcher::Event;
    use std::collections::BTreeSet;

    fn node(name: &str, zone: &str) -> NodeResource {
        NodeResource {
            name: name.to_string(),
            labels: [("zone", zone)].into_iter().collect::<Labels>(),
            ..NodeResource::default()
        }
    }

    #[test]
    fn applied_is_classified_by_prior_presence() {
        let (reader, mut writer) = store();

        let changes = writer.apply(Event::Applied(node("a", "z1")));
        assert!(matches!(changes.as_slice(), [Change::Added(_)]));

        let changes = writer.apply(Event::Applied(node("a", "z2")));
        assert!(matches!(changes.as_slice(), [Change::Updated(_)]));

        assert_eq!(
            reader.get(&ObjectKey::new("a", "")).unwrap().as_ref(),
            &node("a", "z2")
        );
    }

    #[test]
    fn deep_equal_update_is_suppressed() {
        let (_, mut writer) = store();
        writer.apply(Event::Applied(node("a", "z1")));

        let changes = writer.apply(Event::Applied(node("a", "z1")));
        assert!(matches!(changes.as_slice(), [Change::Unchanged(_)]));
        assert_eq!(changes[0].event(), None);
    }

    #[test]
    fn deleted_removes_entry() {
        let (reader, mut writer) = store();
        writer.apply(Event::Applied(node("a", "z1")));

        let changes = writer.apply(Event::Deleted(node("a", "z1")));
        assert!(matches!(changes.as_slice(), [Change::Deleted(_)]));
        assert!(reader.get(&ObjectKey::new("a", "")).is_none());
    }

    #[test]
    fn restart_diffs_against_cached_state() {
        let (reader, mut writer) = store();
        writer.apply(Event::Applied(node("kept", "z1")));
        writer.apply(Event::Applied(node("changed", "z1")));
        writer.apply(Event::Applied(node("dropped", "z1")));

        let snapshot = vec![node("kept", "z1"), node("changed", "z2"), node("new", "z3")];
        let changes = writer.apply(Event::Restarted(snapshot.clone()));

        let mut added = BTreeSet::new();
        let mut updated = BTreeSet::new();
        let mut unchanged = BTreeSet::new();
        let mut deleted = BTreeSet::new();
        for change in changes {
            let name = change.object().name.clone();
            match change {
                Change::Added(_) => added.insert(name),
                Change::Updated(_) => updated.insert(name),
                Change::Unchanged(_) => unchanged.insert(name),
                Change::Deleted(_) => deleted.insert(name),
            };
        }
        assert_eq!(added, BTreeSet::from(["new".to_string()]));
        assert_eq!(updated, BTreeSet::from(["changed".to_string()]));
        assert_eq!(unchanged, BTreeSet::from(["kept".to_string()]));
        assert_eq!(deleted, BTreeSet::from(["dropped".to_string()]));

        // After the restart the cache content equals the snapshot.
        let mut state: Vec<_> = reader.state().iter().map(|n| (**n).clone()).collect();
        let mut expected = snapshot;
        state.sort_by(|a, b| a.name.cmp(&b.name));
        expected.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(state, expected);
    }
}
