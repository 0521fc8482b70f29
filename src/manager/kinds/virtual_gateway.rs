use crate::crd::VirtualGateway;
use crate::error::Result;
use crate::manager::{DependencyValidator, ResourceKind};
use crate::remote::equality::HEALTH_CHECK_PORT;
use crate::remote::types::VirtualGatewayData;
use crate::remote::{RemoteKind, RemoteSpec};

pub struct VirtualGatewayKind;

impl ResourceKind for VirtualGatewayKind {
    type Object = VirtualGateway;
    type Dependencies = ();

    const REMOTE_KIND: RemoteKind = RemoteKind::VirtualGateway;
    const IGNORE_IF_UNSET: &'static [&'static str] = &[HEALTH_CHECK_PORT];

    fn resolve_dependencies(&self, _validator: &DependencyValidator<'_>, _obj: &VirtualGateway) -> Result<()> {
        Ok(())
    }

    fn desired_spec(&self, obj: &VirtualGateway, _deps: &()) -> Result<RemoteSpec> {
        Ok(RemoteSpec::VirtualGateway(VirtualGatewayData {
            listeners: obj.spec.listeners.clone(),
            logging: obj.spec.logging.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{HealthCheckPolicy, Listener, PortMapping, PortProtocol};
    use crate::error::OperatorError;
    use crate::manager::testing::{mesh, remote_resource, virtual_gateway, Mocks, ACCOUNT};
    use crate::manager::ResourceManager;
    use crate::store::MeshStore;

    fn listener(health_check_port: Option<i64>) -> Listener {
        Listener {
            port_mapping: PortMapping {
                port: 8080,
                protocol: PortProtocol::Http,
            },
            health_check: Some(HealthCheckPolicy {
                healthy_threshold: 2,
                interval_millis: 5000,
                path: Some("/ping".to_string()),
                port: health_check_port,
                protocol: PortProtocol::Http,
                timeout_millis: 2000,
                unhealthy_threshold: 2,
            }),
        }
    }

    #[tokio::test]
    async fn test_service_defaulted_health_check_port_is_not_an_update() {
        let store = MeshStore::new();
        let m = mesh("global", "m1", true);
        store.meshes.apply(m.clone());
        let mut vg = virtual_gateway("ingress", "edge", "g1", &m, true);
        vg.spec.listeners = vec![listener(None)];
        vg.status.as_mut().unwrap().external_id = Some("arn:vg/edge_ingress".to_string());
        vg.status.as_mut().unwrap().observed_generation = vg.metadata.generation;

        let mut mocks = Mocks::new();
        mocks.remote.expect_describe().times(1).returning(|_| {
            Ok(remote_resource(
                "arn:vg/edge_ingress",
                ACCOUNT,
                RemoteSpec::VirtualGateway(VirtualGatewayData {
                    listeners: vec![listener(Some(8080))],
                    logging: None,
                }),
                "ACTIVE",
            ))
        });
        mocks.remote.expect_update().times(0);
        mocks.writer.expect_patch_status().times(0);

        let manager = ResourceManager::new(VirtualGatewayKind, mocks.into_context(store));
        manager.reconcile(&vg).await.unwrap();
    }

    #[tokio::test]
    async fn test_inactive_mesh_blocks_remote_calls() {
        let store = MeshStore::new();
        let m = mesh("global", "m1", false);
        store.meshes.apply(m.clone());
        let vg = virtual_gateway("ingress", "edge", "g1", &m, false);

        let mut mocks = Mocks::new();
        mocks.remote.expect_describe().times(0);
        mocks.remote.expect_create().times(0);

        let manager = ResourceManager::new(VirtualGatewayKind, mocks.into_context(store));
        let err = manager.reconcile(&vg).await.unwrap_err();
        assert!(matches!(err, OperatorError::DependencyNotReady { .. }));
        assert!(err.requeue_after().is_some());
    }

    #[tokio::test]
    async fn test_missing_mesh_ref_is_configuration_error() {
        let m = mesh("global", "m1", true);
        let mut vg = virtual_gateway("ingress", "edge", "g1", &m, false);
        vg.spec.mesh_ref = None;

        let manager = ResourceManager::new(VirtualGatewayKind, Mocks::new().into_context(MeshStore::new()));
        let err = manager.reconcile(&vg).await.unwrap_err();
        assert!(matches!(err, OperatorError::Configuration(_)));
    }
}
