//! Deletion blocking while members still reference an object
//!
//! A mesh cannot go away while virtual services, routers, nodes or gateways
//! still point at it, nor a virtual gateway while gateway routes do. The
//! finalizer never deletes members; it reports them and retries later.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::debug;

use crate::crd::{Mesh, MeshObject, VirtualGateway};
use crate::error::{OperatorError, Result};
use crate::events::{reasons, EventRecorder};
use crate::store::MeshStore;

/// A kind whose deletion waits for its members.
pub trait HasMembers: MeshObject {
    /// Number of live members per member kind
    fn count_members(&self, store: &MeshStore) -> Vec<(&'static str, usize)>;
}

impl HasMembers for Mesh {
    fn count_members(&self, store: &MeshStore) -> Vec<(&'static str, usize)> {
        let references_self = |r: Option<&crate::crd::MeshReference>| r.is_some_and(|r| self.is_referenced_by(r));
        vec![
            (
                "virtualService",
                store.virtual_services.list().iter().filter(|o| references_self(o.mesh_ref())).count(),
            ),
            (
                "virtualRouter",
                store.virtual_routers.list().iter().filter(|o| references_self(o.mesh_ref())).count(),
            ),
            (
                "virtualNode",
                store.virtual_nodes.list().iter().filter(|o| references_self(o.mesh_ref())).count(),
            ),
            (
                "virtualGateway",
                store.virtual_gateways.list().iter().filter(|o| references_self(o.mesh_ref())).count(),
            ),
        ]
    }
}

impl HasMembers for VirtualGateway {
    fn count_members(&self, store: &MeshStore) -> Vec<(&'static str, usize)> {
        let routes = store
            .gateway_routes
            .list()
            .iter()
            .filter(|gr| {
                gr.spec
                    .virtual_gateway_ref
                    .as_ref()
                    .is_some_and(|r| self.is_referenced_by(r, gr.namespace().as_deref()))
            })
            .count();
        vec![("gatewayRoute", routes)]
    }
}

/// Holds deletion open while members exist.
pub struct MembersFinalizer {
    store: Arc<MeshStore>,
    events: Arc<dyn EventRecorder>,
    requeue_after: Duration,
}

impl MembersFinalizer {
    pub fn new(store: Arc<MeshStore>, events: Arc<dyn EventRecorder>, requeue_after: Duration) -> Self {
        Self {
            store,
            events,
            requeue_after,
        }
    }

    /// Succeeds once no member references `obj`.
    pub async fn finalize<K: HasMembers>(&self, obj: &K) -> Result<()> {
        let pending: Vec<String> = obj
            .count_members(&self.store)
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(kind, count)| format!("{kind}: {count}"))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let message = format!(
            "objects belonging to this {} exist, please delete them to proceed. {}",
            K::KIND,
            pending.join(", ")
        );
        debug!(kind = K::KIND, name = %obj.name_any(), members = %pending.join(", "), "Deletion waiting for members");
        self.events
            .record(
                &obj.object_ref(&()),
                EventType::Warning,
                reasons::PENDING_MEMBERS_DELETION,
                &message,
            )
            .await;
        Err(OperatorError::PendingDependents {
            message: format!("{} {} has pending members", K::KIND, obj.name_any()),
            requeue_after: self.requeue_after,
        })
    }
}
