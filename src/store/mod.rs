//! Cached view of the declared objects
//!
//! One [`ObjectCache`] per kind, fed by [`informer::run`] and read by the
//! reconciliation engine. Writes go to the API server through
//! [`ObjectWriter`]; the cache catches up through the watch.

mod cache;
pub mod informer;
mod writer;

pub use cache::{IndexFn, ObjectCache, ObjectKey};
pub use writer::{merge_diff, KubeObjectWriter, ObjectTarget, ObjectWriter};

#[cfg(test)]
pub use writer::MockObjectWriter;

use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;

use crate::crd::{GatewayRoute, Mesh, VirtualGateway, VirtualNode, VirtualRouter, VirtualService};

/// Caches for every kind the operator reads.
#[derive(Default)]
pub struct MeshStore {
    pub meshes: Arc<ObjectCache<Mesh>>,
    pub virtual_gateways: Arc<ObjectCache<VirtualGateway>>,
    pub virtual_nodes: Arc<ObjectCache<VirtualNode>>,
    pub virtual_routers: Arc<ObjectCache<VirtualRouter>>,
    pub virtual_services: Arc<ObjectCache<VirtualService>>,
    pub gateway_routes: Arc<ObjectCache<GatewayRoute>>,
    pub namespaces: Arc<ObjectCache<Namespace>>,
}

impl MeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the initial listing of every cache.
    pub async fn wait_ready(&self) {
        tokio::join!(
            self.meshes.wait_ready(),
            self.virtual_gateways.wait_ready(),
            self.virtual_nodes.wait_ready(),
            self.virtual_routers.wait_ready(),
            self.virtual_services.wait_ready(),
            self.gateway_routes.wait_ready(),
            self.namespaces.wait_ready(),
        );
    }
}

/// Selects the cache holding a kind.
pub trait Cached: Sized {
    fn cache(store: &MeshStore) -> &ObjectCache<Self>;
}

impl Cached for Mesh {
    fn cache(store: &MeshStore) -> &ObjectCache<Self> {
        &store.meshes
    }
}

impl Cached for VirtualGateway {
    fn cache(store: &MeshStore) -> &ObjectCache<Self> {
        &store.virtual_gateways
    }
}

impl Cached for VirtualNode {
    fn cache(store: &MeshStore) -> &ObjectCache<Self> {
        &store.virtual_nodes
    }
}

impl Cached for VirtualRouter {
    fn cache(store: &MeshStore) -> &ObjectCache<Self> {
        &store.virtual_routers
    }
}

impl Cached for VirtualService {
    fn cache(store: &MeshStore) -> &ObjectCache<Self> {
        &store.virtual_services
    }
}

impl Cached for GatewayRoute {
    fn cache(store: &MeshStore) -> &ObjectCache<Self> {
        &store.gateway_routes
    }
}

impl Cached for Namespace {
    fn cache(store: &MeshStore) -> &ObjectCache<Self> {
        &store.namespaces
    }
}
