//! Mesh Custom Resource Definition
//!
//! The mesh is the isolation boundary every other kind belongs to.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{non_empty, MeshObject, MeshReference, ResourceStatus};
use crate::conditions::MESH_ACTIVE;

/// Mesh is the Schema for the meshes API
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "appmesh.meshops.io",
    version = "v1beta1",
    kind = "Mesh",
    plural = "meshes",
    status = "ResourceStatus",
    shortname = "mesh",
    printcolumn = r#"{"name":"ARN","type":"string","jsonPath":".status.arn"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    /// Name of the remote mesh. Defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,

    /// Account owning the remote mesh when it is shared with this account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_owner: Option<String>,

    /// Namespaces whose resources join this mesh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_filter: Option<EgressFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EgressFilter {
    pub r#type: EgressFilterType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EgressFilterType {
    AllowAll,
    DropAll,
}

impl Mesh {
    /// Whether `reference` points at this exact mesh instance.
    pub fn is_referenced_by(&self, reference: &MeshReference) -> bool {
        reference.name == self.name_any() && Some(reference.uid.as_str()) == self.uid().as_deref()
    }
}

impl MeshObject for Mesh {
    const KIND: &'static str = "Mesh";
    const ACTIVE_CONDITION: &'static str = MESH_ACTIVE;
    const NAMESPACED: bool = false;

    fn external_name(&self) -> String {
        non_empty(self.spec.aws_name.as_ref()).unwrap_or_else(|| self.name_any())
    }

    fn mesh_ref(&self) -> Option<&MeshReference> {
        None
    }

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }

    fn resource_status_mut(&mut self) -> &mut ResourceStatus {
        self.status.get_or_insert_with(ResourceStatus::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_spec_defaults() {
        let spec: MeshSpec = serde_json::from_str("{}").unwrap();
        assert!(spec.aws_name.is_none());
        assert!(spec.namespace_selector.is_none());
    }

    #[test]
    fn test_external_name_defaults_to_object_name() {
        let mesh = Mesh::new("global", MeshSpec::default());
        assert_eq!(mesh.external_name(), "global");

        let named = Mesh::new(
            "global",
            MeshSpec {
                aws_name: Some("prod-mesh".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(named.external_name(), "prod-mesh");
    }

    #[test]
    fn test_is_referenced_by_checks_uid() {
        let mut mesh = Mesh::new("global", MeshSpec::default());
        mesh.metadata.uid = Some("u1".to_string());

        assert!(mesh.is_referenced_by(&MeshReference {
            name: "global".to_string(),
            uid: "u1".to_string()
        }));
        assert!(!mesh.is_referenced_by(&MeshReference {
            name: "global".to_string(),
            uid: "u2".to_string()
        }));
    }

    #[test]
    fn test_egress_filter_wire_format() {
        let spec: MeshSpec =
            serde_json::from_str(r#"{"egressFilter": {"type": "ALLOW_ALL"}}"#).unwrap();
        assert_eq!(
            spec.egress_filter.map(|f| f.r#type),
            Some(EgressFilterType::AllowAll)
        );
    }
}
