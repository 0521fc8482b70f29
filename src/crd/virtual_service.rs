//! VirtualService Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    default_external_name, non_empty, MeshObject, MeshReference, ResourceStatus,
    VirtualNodeReference, VirtualRouterReference,
};
use crate::conditions::VIRTUAL_SERVICE_ACTIVE;

/// VirtualService is the Schema for the virtualservices API
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "appmesh.meshops.io",
    version = "v1beta1",
    kind = "VirtualService",
    namespaced,
    status = "ResourceStatus",
    shortname = "vs",
    printcolumn = r#"{"name":"ARN","type":"string","jsonPath":".status.arn"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    /// Name of the remote virtual service. Defaults to `<name>.<namespace>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,

    /// Where traffic for this service goes. At most one provider is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<VirtualServiceProvider>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_node: Option<VirtualNodeServiceProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_router: Option<VirtualRouterServiceProvider>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNodeServiceProvider {
    pub virtual_node_ref: VirtualNodeReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterServiceProvider {
    pub virtual_router_ref: VirtualRouterReference,
}

impl VirtualService {
    pub fn virtual_node_ref(&self) -> Option<&VirtualNodeReference> {
        self.spec
            .provider
            .as_ref()
            .and_then(|p| p.virtual_node.as_ref())
            .map(|p| &p.virtual_node_ref)
    }

    pub fn virtual_router_ref(&self) -> Option<&VirtualRouterReference> {
        self.spec
            .provider
            .as_ref()
            .and_then(|p| p.virtual_router.as_ref())
            .map(|p| &p.virtual_router_ref)
    }
}

impl MeshObject for VirtualService {
    const KIND: &'static str = "VirtualService";
    const ACTIVE_CONDITION: &'static str = VIRTUAL_SERVICE_ACTIVE;

    fn external_name(&self) -> String {
        non_empty(self.spec.aws_name.as_ref()).unwrap_or_else(|| default_external_name(self, '.'))
    }

    fn mesh_ref(&self) -> Option<&MeshReference> {
        self.spec.mesh_ref.as_ref()
    }

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }

    fn resource_status_mut(&mut self) -> &mut ResourceStatus {
        self.status.get_or_insert_with(ResourceStatus::default)
    }
}
