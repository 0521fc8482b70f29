//! Reverse-dependency index
//!
//! For each kind, records which objects it references, keyed by the referent
//! kind. Answers "which GatewayRoutes point at VirtualService ns/x" so that a
//! readiness change on the referent can requeue its dependents.

use std::sync::Arc;

use kube::ResourceExt;

use super::object_key_for;
use crate::crd::{GatewayRoute, MeshObject, VirtualGateway, VirtualNode, VirtualRouter, VirtualService};
use crate::error::Result;
use crate::store::{IndexFn, MeshStore, ObjectCache, ObjectKey};

const INDEX_KEY_PREFIX: &str = "ref:";

/// Pure extraction of the keys an object references
pub type Extractor<K> = fn(&K) -> Vec<ObjectKey>;

/// Index key under which references to `referent_kind` are recorded
pub fn index_key(referent_kind: &str) -> String {
    format!("{INDEX_KEY_PREFIX}{referent_kind}")
}

/// Reverse index over one kind.
pub struct ObjectReferenceIndexer<K> {
    cache: Arc<ObjectCache<K>>,
}

impl<K> Clone for ObjectReferenceIndexer<K> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<K: Send + Sync + 'static> ObjectReferenceIndexer<K> {
    /// Register one index per referent kind on `cache`.
    pub fn setup(
        cache: Arc<ObjectCache<K>>,
        extractors: impl IntoIterator<Item = (&'static str, Extractor<K>)>,
    ) -> Result<Self> {
        for (referent_kind, extract) in extractors {
            let index_fn: IndexFn<K> =
                Arc::new(move |obj: &K| extract(obj).iter().map(ObjectKey::to_string).collect());
            cache.register_index(index_key(referent_kind), index_fn)?;
        }
        Ok(Self { cache })
    }

    /// Objects referencing `referent_key` of `referent_kind`
    pub fn fetch(&self, referent_kind: &str, referent_key: &ObjectKey) -> Result<Vec<Arc<K>>> {
        self.cache
            .by_index(&index_key(referent_kind), &referent_key.to_string())
    }
}

fn mesh_of<K: MeshObject>(obj: &K) -> Vec<ObjectKey> {
    obj.mesh_ref()
        .map(|r| object_key_for(obj.namespace().as_deref(), r))
        .into_iter()
        .collect()
}

fn gateway_route_virtual_gateway(gr: &GatewayRoute) -> Vec<ObjectKey> {
    let ns = gr.namespace();
    gr.spec
        .virtual_gateway_ref
        .iter()
        .map(|r| object_key_for(ns.as_deref(), r))
        .collect()
}

fn gateway_route_virtual_services(gr: &GatewayRoute) -> Vec<ObjectKey> {
    let ns = gr.namespace();
    gr.virtual_service_refs()
        .into_iter()
        .map(|r| object_key_for(ns.as_deref(), r))
        .collect()
}

fn virtual_service_virtual_node(vs: &VirtualService) -> Vec<ObjectKey> {
    let ns = vs.namespace();
    vs.virtual_node_ref()
        .map(|r| object_key_for(ns.as_deref(), r))
        .into_iter()
        .collect()
}

fn virtual_service_virtual_router(vs: &VirtualService) -> Vec<ObjectKey> {
    let ns = vs.namespace();
    vs.virtual_router_ref()
        .map(|r| object_key_for(ns.as_deref(), r))
        .into_iter()
        .collect()
}

fn virtual_router_virtual_nodes(vr: &VirtualRouter) -> Vec<ObjectKey> {
    let ns = vr.namespace();
    let mut keys: Vec<ObjectKey> = vr
        .virtual_node_refs()
        .map(|r| object_key_for(ns.as_deref(), r))
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

fn virtual_node_virtual_services(vn: &VirtualNode) -> Vec<ObjectKey> {
    let ns = vn.namespace();
    vn.spec
        .backends
        .iter()
        .map(|b| object_key_for(ns.as_deref(), &b.virtual_service.virtual_service_ref))
        .collect()
}

/// Reverse indexes for every namespaced kind.
#[derive(Clone)]
pub struct MeshIndexers {
    pub virtual_gateways: ObjectReferenceIndexer<VirtualGateway>,
    pub virtual_nodes: ObjectReferenceIndexer<VirtualNode>,
    pub virtual_routers: ObjectReferenceIndexer<VirtualRouter>,
    pub virtual_services: ObjectReferenceIndexer<VirtualService>,
    pub gateway_routes: ObjectReferenceIndexer<GatewayRoute>,
}

impl MeshIndexers {
    /// Register every index. Must run before the informers start.
    pub fn setup(store: &MeshStore) -> Result<Self> {
        Ok(Self {
            virtual_gateways: ObjectReferenceIndexer::setup(
                store.virtual_gateways.clone(),
                [("Mesh", mesh_of::<VirtualGateway> as Extractor<VirtualGateway>)],
            )?,
            virtual_nodes: ObjectReferenceIndexer::setup(
                store.virtual_nodes.clone(),
                [
                    ("Mesh", mesh_of::<VirtualNode> as Extractor<VirtualNode>),
                    ("VirtualService", virtual_node_virtual_services),
                ],
            )?,
            virtual_routers: ObjectReferenceIndexer::setup(
                store.virtual_routers.clone(),
                [
                    ("Mesh", mesh_of::<VirtualRouter> as Extractor<VirtualRouter>),
                    ("VirtualNode", virtual_router_virtual_nodes),
                ],
            )?,
            virtual_services: ObjectReferenceIndexer::setup(
                store.virtual_services.clone(),
                [
                    ("Mesh", mesh_of::<VirtualService> as Extractor<VirtualService>),
                    ("VirtualNode", virtual_service_virtual_node),
                    ("VirtualRouter", virtual_service_virtual_router),
                ],
            )?,
            gateway_routes: ObjectReferenceIndexer::setup(
                store.gateway_routes.clone(),
                [
                    ("Mesh", mesh_of::<GatewayRoute> as Extractor<GatewayRoute>),
                    ("VirtualGateway", gateway_route_virtual_gateway),
                    ("VirtualService", gateway_route_virtual_services),
                ],
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GatewayRouteSpec, MeshReference, VirtualGatewayReference};

    fn gateway_route(ns: &str, name: &str, json: &str) -> GatewayRoute {
        let spec: GatewayRouteSpec = serde_json::from_str(json).unwrap();
        let mut gr = GatewayRoute::new(name, spec);
        gr.metadata.namespace = Some(ns.to_string());
        gr
    }

    #[test]
    fn test_index_key_format() {
        assert_eq!(index_key("VirtualService"), "ref:VirtualService");
    }

    #[test]
    fn test_fetch_gateway_routes_by_virtual_service() {
        let store = MeshStore::new();
        let indexers = MeshIndexers::setup(&store).unwrap();

        store.gateway_routes.apply(gateway_route(
            "ns",
            "a",
            r#"{"httpRoute": {"match": {"prefix": "/"}, "action": {"target": {"virtualService": {"virtualServiceRef": {"name": "x"}}}}}}"#,
        ));
        store.gateway_routes.apply(gateway_route(
            "other",
            "b",
            r#"{"httpRoute": {"match": {"prefix": "/"}, "action": {"target": {"virtualService": {"virtualServiceRef": {"namespace": "ns", "name": "x"}}}}}}"#,
        ));
        store.gateway_routes.apply(gateway_route(
            "ns",
            "c",
            r#"{"httpRoute": {"match": {"prefix": "/"}, "action": {"target": {"virtualService": {"virtualServiceRef": {"name": "y"}}}}}}"#,
        ));

        let mut names: Vec<String> = indexers
            .gateway_routes
            .fetch("VirtualService", &ObjectKey::namespaced("ns", "x"))
            .unwrap()
            .iter()
            .map(|gr| gr.name_any())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_fetch_by_mesh_and_gateway() {
        let store = MeshStore::new();
        let indexers = MeshIndexers::setup(&store).unwrap();

        let mut gr = GatewayRoute::new("r", GatewayRouteSpec::default());
        gr.metadata.namespace = Some("ns".to_string());
        gr.spec.mesh_ref = Some(MeshReference {
            name: "global".to_string(),
            uid: "m1".to_string(),
        });
        gr.spec.virtual_gateway_ref = Some(VirtualGatewayReference {
            namespace: Some("edge".to_string()),
            name: "ingress".to_string(),
            uid: "g1".to_string(),
        });
        store.gateway_routes.apply(gr);

        assert_eq!(
            indexers
                .gateway_routes
                .fetch("Mesh", &ObjectKey::cluster("global"))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            indexers
                .gateway_routes
                .fetch("VirtualGateway", &ObjectKey::namespaced("edge", "ingress"))
                .unwrap()
                .len(),
            1
        );
        assert!(indexers
            .gateway_routes
            .fetch("VirtualGateway", &ObjectKey::namespaced("ns", "ingress"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_setup_twice_fails() {
        let store = MeshStore::new();
        MeshIndexers::setup(&store).unwrap();
        assert!(MeshIndexers::setup(&store).is_err());
    }
}
