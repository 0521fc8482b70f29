use std::sync::Arc;

use crate::crd::{MeshObject, VirtualNode, VirtualRouter, VirtualService};
use crate::error::Result;
use crate::manager::{DependencyValidator, ResourceKind};
use crate::remote::types::{
    ProviderData, VirtualNodeProviderData, VirtualRouterProviderData, VirtualServiceData,
};
use crate::remote::{RemoteKind, RemoteSpec};

pub struct VirtualServiceKind;

/// Resolved provider of a virtual service
#[derive(Default)]
pub struct Providers {
    virtual_node: Option<Arc<VirtualNode>>,
    virtual_router: Option<Arc<VirtualRouter>>,
}

impl ResourceKind for VirtualServiceKind {
    type Object = VirtualService;
    type Dependencies = Providers;

    const REMOTE_KIND: RemoteKind = RemoteKind::VirtualService;

    fn resolve_dependencies(&self, validator: &DependencyValidator<'_>, obj: &VirtualService) -> Result<Providers> {
        let virtual_node = obj
            .virtual_node_ref()
            .map(|r| validator.active(obj, r, "virtualNodeRef"))
            .transpose()?;
        let virtual_router = obj
            .virtual_router_ref()
            .map(|r| validator.active(obj, r, "virtualRouterRef"))
            .transpose()?;
        Ok(Providers {
            virtual_node,
            virtual_router,
        })
    }

    fn desired_spec(&self, obj: &VirtualService, deps: &Providers) -> Result<RemoteSpec> {
        let provider = obj.spec.provider.as_ref().map(|_| ProviderData {
            virtual_node: deps.virtual_node.as_ref().map(|vn| VirtualNodeProviderData {
                virtual_node_name: vn.external_name(),
            }),
            virtual_router: deps.virtual_router.as_ref().map(|vr| VirtualRouterProviderData {
                virtual_router_name: vr.external_name(),
            }),
        });
        Ok(RemoteSpec::VirtualService(VirtualServiceData { provider }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        VirtualRouterReference, VirtualRouterServiceProvider, VirtualServiceProvider,
    };
    use crate::error::OperatorError;
    use crate::conditions::VIRTUAL_SERVICE_ACTIVE;
    use crate::manager::testing::{
        mesh, remote_resource, set_active, virtual_router, virtual_service, Mocks, ACCOUNT,
        OTHER_ACCOUNT,
    };
    use crate::manager::ResourceManager;
    use crate::store::MeshStore;
    use kube::runtime::events::EventType;

    fn routed_service(m: &crate::crd::Mesh) -> VirtualService {
        let mut vs = virtual_service("bookinfo", "reviews", m, true);
        vs.spec.provider = Some(VirtualServiceProvider {
            virtual_node: None,
            virtual_router: Some(VirtualRouterServiceProvider {
                virtual_router_ref: VirtualRouterReference {
                    namespace: None,
                    name: "reviews-router".to_string(),
                },
            }),
        });
        vs
    }

    #[tokio::test]
    async fn test_inactive_provider_blocks_remote_calls() {
        let store = MeshStore::new();
        let m = mesh("global", "m1", true);
        store.meshes.apply(m.clone());
        store
            .virtual_routers
            .apply(virtual_router("bookinfo", "reviews-router", &m, false));

        let mut mocks = Mocks::new();
        mocks.remote.expect_describe().times(0);
        mocks.remote.expect_create().times(0);
        mocks.remote.expect_update().times(0);

        let manager = ResourceManager::new(VirtualServiceKind, mocks.into_context(store));
        let err = manager.reconcile(&routed_service(&m)).await.unwrap_err();
        assert!(matches!(err, OperatorError::DependencyNotReady { .. }));
    }

    #[tokio::test]
    async fn test_differing_spec_controlled_elsewhere_is_left_alone() {
        let store = MeshStore::new();
        let m = mesh("global", "m1", true);
        store.meshes.apply(m.clone());
        store
            .virtual_routers
            .apply(virtual_router("bookinfo", "reviews-router", &m, true));
        let mut vs = routed_service(&m);
        vs.status.as_mut().unwrap().external_id = Some("arn:vs/reviews.bookinfo".to_string());
        vs.status.as_mut().unwrap().observed_generation = Some(1);

        let mut mocks = Mocks::new();
        mocks.remote.expect_describe().times(1).returning(|_| {
            Ok(remote_resource(
                "arn:vs/reviews.bookinfo",
                OTHER_ACCOUNT,
                RemoteSpec::VirtualService(VirtualServiceData::default()),
                "ACTIVE",
            ))
        });
        mocks.remote.expect_update().times(0);
        mocks
            .events
            .expect_record()
            .withf(|_, type_, reason, _| {
                *type_ == EventType::Warning && reason == crate::events::reasons::NOT_CONTROLLED
            })
            .times(1)
            .returning(|_, _, _, _| ());

        let manager = ResourceManager::new(VirtualServiceKind, mocks.into_context(store));
        manager.reconcile(&vs).await.unwrap();
    }

    fn routed_spec() -> RemoteSpec {
        RemoteSpec::VirtualService(VirtualServiceData {
            provider: Some(ProviderData {
                virtual_node: None,
                virtual_router: Some(VirtualRouterProviderData {
                    virtual_router_name: "reviews-router_bookinfo".to_string(),
                }),
            }),
        })
    }

    /// Mocks for a controlled remote service whose provider is out of date,
    /// updated into `status`.
    fn stale_remote(status: &'static str) -> Mocks {
        let mut mocks = Mocks::new();
        mocks.remote.expect_describe().times(1).returning(|_| {
            Ok(remote_resource(
                "arn:vs/reviews.bookinfo",
                ACCOUNT,
                RemoteSpec::VirtualService(VirtualServiceData::default()),
                "ACTIVE",
            ))
        });
        mocks
            .remote
            .expect_update()
            .withf(|locator, spec| locator.name == "reviews.bookinfo" && *spec == routed_spec())
            .times(1)
            .returning(move |_, spec| Ok(remote_resource("arn:vs/reviews.bookinfo", ACCOUNT, spec.clone(), status)));
        mocks.remote.expect_create().times(0);
        mocks
    }

    fn stale_store(m: &crate::crd::Mesh) -> MeshStore {
        let store = MeshStore::new();
        store.meshes.apply(m.clone());
        store
            .virtual_routers
            .apply(virtual_router("bookinfo", "reviews-router", m, true));
        store
    }

    #[tokio::test]
    async fn test_differing_controlled_spec_is_updated() {
        let m = mesh("global", "m1", true);
        let mut vs = routed_service(&m);
        set_active(&mut vs, false);

        let mut mocks = stale_remote("ACTIVE");
        mocks
            .writer
            .expect_patch_status()
            .withf(|_, patch| {
                let conditions = patch["conditions"].as_array().cloned().unwrap_or_default();
                patch["arn"] == "arn:vs/reviews.bookinfo"
                    && conditions.iter().any(|c| {
                        c["type"] == VIRTUAL_SERVICE_ACTIVE && c["status"] == "True" && c.get("reason").is_none()
                    })
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let manager = ResourceManager::new(VirtualServiceKind, mocks.into_context(stale_store(&m)));
        manager.reconcile(&vs).await.unwrap();
    }

    #[tokio::test]
    async fn test_inactive_remote_status_becomes_condition_reason() {
        let m = mesh("global", "m1", true);
        let vs = routed_service(&m);

        let mut mocks = stale_remote("INACTIVE");
        mocks
            .writer
            .expect_patch_status()
            .withf(|_, patch| {
                let conditions = patch["conditions"].as_array().cloned().unwrap_or_default();
                conditions.iter().any(|c| {
                    c["type"] == VIRTUAL_SERVICE_ACTIVE && c["status"] == "False" && c["reason"] == "INACTIVE"
                })
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let manager = ResourceManager::new(VirtualServiceKind, mocks.into_context(stale_store(&m)));
        manager.reconcile(&vs).await.unwrap();
    }
}
