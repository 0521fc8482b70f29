//! Fixtures shared by engine tests

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;

use super::{EngineContext, EngineSettings};
use crate::conditions::ConditionStatus;
use crate::crd::{
    Mesh, MeshObject, MeshReference, MeshSpec, VirtualGateway, VirtualGatewaySpec, VirtualNode,
    VirtualNodeSpec, VirtualRouter, VirtualRouterSpec, VirtualService, VirtualServiceSpec,
};
use crate::events::MockEventRecorder;
use crate::references::ReferenceResolver;
use crate::remote::{MockMeshServiceClient, RemoteResource, RemoteSpec};
use crate::store::{MeshStore, MockObjectWriter};

pub(crate) const ACCOUNT: &str = "111122223333";
pub(crate) const OTHER_ACCOUNT: &str = "999988887777";
pub(crate) const REQUEUE: Duration = Duration::from_secs(5);

/// Set the active condition and an empty status when absent.
pub(crate) fn set_active<K: MeshObject>(obj: &mut K, active: bool) {
    obj.resource_status_mut().conditions.upsert(
        K::ACTIVE_CONDITION,
        ConditionStatus::from_bool(active),
        None,
        None,
    );
}

fn namespaced<K: MeshObject>(mut obj: K, namespace: &str, uid: &str, active: bool) -> K {
    obj.meta_mut().namespace = Some(namespace.to_string());
    obj.meta_mut().uid = Some(uid.to_string());
    obj.meta_mut().generation = Some(1);
    obj.meta_mut().resource_version = Some("1".to_string());
    set_active(&mut obj, active);
    obj
}

pub(crate) fn mesh(name: &str, uid: &str, active: bool) -> Mesh {
    let mut mesh = Mesh::new(name, MeshSpec::default());
    mesh.metadata.uid = Some(uid.to_string());
    mesh.metadata.generation = Some(1);
    mesh.metadata.resource_version = Some("1".to_string());
    set_active(&mut mesh, active);
    mesh
}

pub(crate) fn mesh_ref(mesh: &Mesh) -> MeshReference {
    MeshReference {
        name: mesh.name_any(),
        uid: mesh.uid().unwrap_or_default(),
    }
}

pub(crate) fn virtual_gateway(ns: &str, name: &str, uid: &str, mesh: &Mesh, active: bool) -> VirtualGateway {
    let spec = VirtualGatewaySpec {
        mesh_ref: Some(mesh_ref(mesh)),
        ..Default::default()
    };
    namespaced(VirtualGateway::new(name, spec), ns, uid, active)
}

pub(crate) fn virtual_node(ns: &str, name: &str, mesh: &Mesh, active: bool) -> VirtualNode {
    let spec = VirtualNodeSpec {
        mesh_ref: Some(mesh_ref(mesh)),
        ..Default::default()
    };
    namespaced(VirtualNode::new(name, spec), ns, &format!("vn-{name}"), active)
}

pub(crate) fn virtual_router(ns: &str, name: &str, mesh: &Mesh, active: bool) -> VirtualRouter {
    let spec = VirtualRouterSpec {
        mesh_ref: Some(mesh_ref(mesh)),
        ..Default::default()
    };
    namespaced(VirtualRouter::new(name, spec), ns, &format!("vr-{name}"), active)
}

pub(crate) fn virtual_service(ns: &str, name: &str, mesh: &Mesh, active: bool) -> VirtualService {
    let spec = VirtualServiceSpec {
        mesh_ref: Some(mesh_ref(mesh)),
        ..Default::default()
    };
    namespaced(VirtualService::new(name, spec), ns, &format!("vs-{name}"), active)
}

pub(crate) fn remote_resource(external_id: &str, owner: &str, spec: RemoteSpec, status: &str) -> RemoteResource {
    RemoteResource {
        external_id: external_id.to_string(),
        resource_owner: owner.to_string(),
        spec,
        status: status.to_string(),
    }
}

/// Mocked collaborators. Unexpected calls fail the test.
pub(crate) struct Mocks {
    pub remote: MockMeshServiceClient,
    pub writer: MockObjectWriter,
    pub events: MockEventRecorder,
}

impl Mocks {
    pub fn new() -> Self {
        Self {
            remote: MockMeshServiceClient::new(),
            writer: MockObjectWriter::new(),
            events: MockEventRecorder::new(),
        }
    }

    pub fn into_context(self, store: MeshStore) -> Arc<EngineContext> {
        self.into_context_shared(Arc::new(store))
    }

    pub fn into_context_shared(self, store: Arc<MeshStore>) -> Arc<EngineContext> {
        Arc::new(EngineContext {
            resolver: ReferenceResolver::new(store),
            remote: Arc::new(self.remote),
            writer: Arc::new(self.writer),
            events: Arc::new(self.events),
            settings: EngineSettings {
                account_id: ACCOUNT.to_string(),
                dependency_requeue: REQUEUE,
            },
        })
    }
}
