//! VirtualGateway Custom Resource Definition

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    default_external_name, non_empty, Listener, Logging, MeshObject, MeshReference,
    ResourceStatus, VirtualGatewayReference,
};
use crate::conditions::VIRTUAL_GATEWAY_ACTIVE;

/// VirtualGateway is the Schema for the virtualgateways API
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "appmesh.meshops.io",
    version = "v1beta1",
    kind = "VirtualGateway",
    namespaced,
    status = "ResourceStatus",
    shortname = "vg",
    printcolumn = r#"{"name":"ARN","type":"string","jsonPath":".status.arn"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualGatewaySpec {
    /// Name of the remote virtual gateway. Defaults to `<name>_<namespace>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,

    /// Namespaces whose gateway routes attach to this gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    /// Pods that act as this gateway's envoys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,

    /// Further narrows which gateway routes attach. Unset selects every route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_route_selector: Option<LabelSelector>,

    #[serde(default)]
    pub listeners: Vec<Listener>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
}

impl VirtualGateway {
    /// Whether `reference`, made from an object in `referencing_namespace`,
    /// points at this exact gateway instance.
    pub fn is_referenced_by(
        &self,
        reference: &VirtualGatewayReference,
        referencing_namespace: Option<&str>,
    ) -> bool {
        let namespace = reference
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .or(referencing_namespace);
        reference.name == self.name_any()
            && namespace == self.namespace().as_deref()
            && Some(reference.uid.as_str()) == self.uid().as_deref()
    }
}

impl MeshObject for VirtualGateway {
    const KIND: &'static str = "VirtualGateway";
    const ACTIVE_CONDITION: &'static str = VIRTUAL_GATEWAY_ACTIVE;

    fn external_name(&self) -> String {
        non_empty(self.spec.aws_name.as_ref()).unwrap_or_else(|| default_external_name(self, '_'))
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
