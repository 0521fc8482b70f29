use super::{remote_name, resolve_all, Readiness, Resolved};
use crate::crd::{VirtualNode, VirtualService};
use crate::error::Result;
use crate::manager::{DependencyValidator, ResourceKind};
use crate::remote::equality::HEALTH_CHECK_PORT;
use crate::remote::types::{
    BackendData, CloudMapAttributeData, CloudMapData, DnsData, ServiceDiscoveryData, VirtualNodeData,
    VirtualServiceBackendData,
};
use crate::remote::{RemoteKind, RemoteSpec};

/// Backend virtual services must share the node's mesh but need not be
/// active: a service commonly routes back to the nodes that call it.
pub struct VirtualNodeKind;

impl ResourceKind for VirtualNodeKind {
    type Object = VirtualNode;
    type Dependencies = Resolved<VirtualService>;

    const REMOTE_KIND: RemoteKind = RemoteKind::VirtualNode;
    const IGNORE_IF_UNSET: &'static [&'static str] = &[HEALTH_CHECK_PORT];

    fn resolve_dependencies(
        &self,
        validator: &DependencyValidator<'_>,
        obj: &VirtualNode,
    ) -> Result<Resolved<VirtualService>> {
        let backends = obj
            .spec
            .backends
            .iter()
            .map(|b| &b.virtual_service.virtual_service_ref);
        resolve_all(validator, obj, backends, "virtualServiceRef", Readiness::Member)
    }

    fn desired_spec(&self, obj: &VirtualNode, deps: &Resolved<VirtualService>) -> Result<RemoteSpec> {
        let backends = obj
            .spec
            .backends
            .iter()
            .map(|backend| {
                let name = remote_name(deps, obj, &backend.virtual_service.virtual_service_ref)?;
                Ok(BackendData {
                    virtual_service: VirtualServiceBackendData {
                        virtual_service_name: name,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let service_discovery = obj.spec.service_discovery.as_ref().map(|sd| ServiceDiscoveryData {
            aws_cloud_map: sd.cloud_map.as_ref().map(|cm| CloudMapData {
                namespace_name: cm.namespace_name.clone(),
                service_name: cm.service_name.clone(),
                attributes: cm
                    .attributes
                    .iter()
                    .map(|a| CloudMapAttributeData {
                        key: a.key.clone(),
                        value: a.value.clone(),
                    })
                    .collect(),
            }),
            dns: sd.dns.as_ref().map(|dns| DnsData {
                hostname: dns.hostname.clone(),
            }),
        });

        Ok(RemoteSpec::VirtualNode(VirtualNodeData {
            listeners: obj.spec.listeners.clone(),
            service_discovery,
            backends,
            logging: obj.spec.logging.clone(),
        }))
    }
}
