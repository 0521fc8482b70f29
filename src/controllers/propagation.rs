//! Readiness propagation between kinds
//!
//! Dependents are blocked while a prerequisite is not active. When the
//! prerequisite flips, its dependents are requeued through the reverse
//! index instead of waiting for their own retry.

use dashmap::DashMap;
use kube::runtime::reflector::ObjectRef;
use tracing::{debug, warn};

use crate::crd::MeshObject;
use crate::references::ObjectReferenceIndexer;
use crate::store::ObjectKey;

/// Last-seen Active state per prerequisite.
#[derive(Default)]
pub struct ActiveStateTracker {
    last_seen: DashMap<ObjectKey, bool>,
}

impl ActiveStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the Active state of `obj`; true when it differs from the last
    /// one seen. The first sighting only records. An object being deleted is
    /// forgotten and never reported.
    pub fn observe<K: MeshObject>(&self, obj: &K) -> bool {
        let key = ObjectKey::of(obj);
        if obj.is_deleting() {
            self.last_seen.remove(&key);
            return false;
        }
        let active = obj.is_active();
        match self.last_seen.insert(key, active) {
            Some(previous) => previous != active,
            None => false,
        }
    }
}

/// Watch mapper from a prerequisite of kind `P` to the `K` objects
/// referencing it.
pub fn dependents<P, K>(
    indexer: ObjectReferenceIndexer<K>,
) -> impl Fn(P) -> Vec<ObjectRef<K>> + Send + Sync + 'static
where
    P: MeshObject,
    K: MeshObject,
{
    let tracker = ActiveStateTracker::new();
    move |prerequisite: P| {
        if !tracker.observe(&prerequisite) {
            return Vec::new();
        }
        let key = ObjectKey::of(&prerequisite);
        match indexer.fetch(P::KIND, &key) {
            Ok(objs) => {
                debug!(
                    kind = P::KIND,
                    key = %key,
                    active = prerequisite.is_active(),
                    dependent_kind = K::KIND,
                    count = objs.len(),
                    "Requeueing dependents"
                );
                objs.iter().map(|o| ObjectRef::from_obj(o.as_ref())).collect()
            }
            Err(e) => {
                warn!(kind = P::KIND, key = %key, error = %e, "Failed to look up dependents");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use super::*;
    use crate::crd::{Mesh, VirtualNode};
    use crate::manager::testing::{mesh, set_active, virtual_node};
    use crate::references::MeshIndexers;
    use crate::store::MeshStore;

    #[test]
    fn test_first_sighting_only_records() {
        let tracker = ActiveStateTracker::new();
        assert!(!tracker.observe(&mesh("global", "m1", true)));
        assert!(!tracker.observe(&mesh("global", "m1", true)));
    }

    #[test]
    fn test_flip_in_either_direction_is_reported() {
        let tracker = ActiveStateTracker::new();
        let mut m = mesh("global", "m1", false);
        tracker.observe(&m);
        set_active(&mut m, true);
        assert!(tracker.observe(&m));
        assert!(!tracker.observe(&m));
        set_active(&mut m, false);
        assert!(tracker.observe(&m));
    }

    #[test]
    fn test_deleting_object_is_forgotten() {
        let tracker = ActiveStateTracker::new();
        tracker.observe(&mesh("global", "m1", false));

        let mut deleting = mesh("global", "m1", true);
        deleting.metadata.deletion_timestamp = Some(Time(Utc::now()));
        assert!(!tracker.observe(&deleting));
        assert!(tracker.last_seen.is_empty());

        // a recreated object starts over
        assert!(!tracker.observe(&mesh("global", "m2", true)));
    }

    #[test]
    fn test_keys_are_tracked_separately() {
        let tracker = ActiveStateTracker::new();
        tracker.observe(&mesh("global", "m1", false));
        assert!(!tracker.observe(&mesh("other", "m2", true)));
    }

    #[test]
    fn test_mesh_activation_requeues_its_members_only() {
        let store = Arc::new(MeshStore::new());
        let indexers = MeshIndexers::setup(&store).unwrap();
        let m = mesh("global", "m1", false);
        let other = mesh("other", "m2", true);
        store.virtual_nodes.apply(virtual_node("bookinfo", "reviews", &m, false));
        store.virtual_nodes.apply(virtual_node("bookinfo", "ratings", &other, false));

        let mapper = dependents::<Mesh, VirtualNode>(indexers.virtual_nodes.clone());
        assert!(mapper(m.clone()).is_empty());

        let mut activated = m;
        set_active(&mut activated, true);
        let refs = mapper(activated);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "reviews");
        assert_eq!(refs[0].namespace.as_deref(), Some("bookinfo"));
    }
}
