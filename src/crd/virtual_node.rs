//! VirtualNode Custom Resource Definition

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    default_external_name, non_empty, Listener, Logging, MeshObject, MeshReference,
    ResourceStatus, VirtualServiceReference,
};
use crate::conditions::VIRTUAL_NODE_ACTIVE;

/// VirtualNode is the Schema for the virtualnodes API
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "appmesh.meshops.io",
    version = "v1beta1",
    kind = "VirtualNode",
    namespaced,
    status = "ResourceStatus",
    shortname = "vn",
    printcolumn = r#"{"name":"ARN","type":"string","jsonPath":".status.arn"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNodeSpec {
    /// Name of the remote virtual node. Defaults to `<name>_<namespace>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,

    /// Pods backing this virtual node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,

    #[serde(default)]
    pub listeners: Vec<Listener>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_discovery: Option<ServiceDiscovery>,

    /// Virtual services this node sends traffic to
    #[serde(default)]
    pub backends: Vec<Backend>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDiscovery {
    #[serde(rename = "awsCloudMap", default, skip_serializing_if = "Option::is_none")]
    pub cloud_map: Option<CloudMapServiceDiscovery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsServiceDiscovery>,
}

/// Instances are discovered through a Cloud Map service
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudMapServiceDiscovery {
    pub namespace_name: String,
    pub service_name: String,
    /// Only instances carrying all of these attributes are selected
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<CloudMapInstanceAttribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CloudMapInstanceAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DnsServiceDiscovery {
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub virtual_service: VirtualServiceBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceBackend {
    pub virtual_service_ref: VirtualServiceReference,
}

impl MeshObject for VirtualNode {
    const KIND: &'static str = "VirtualNode";
    const ACTIVE_CONDITION: &'static str = VIRTUAL_NODE_ACTIVE;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_node_backends() {
        let json = r#"{
            "meshRef": {"name": "global", "uid": "m1"},
            "listeners": [{"portMapping": {"port": 9080, "protocol": "http"}}],
            "serviceDiscovery": {"dns": {"hostname": "reviews.bookinfo.svc.cluster.local"}},
            "backends": [
                {"virtualService": {"virtualServiceRef": {"name": "ratings"}}},
                {"virtualService": {"virtualServiceRef": {"namespace": "shared", "name": "auth"}}}
            ]
        }"#;
        let spec: VirtualNodeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.backends.len(), 2);
        assert!(spec.backends[0].virtual_service.virtual_service_ref.namespace.is_none());
        assert_eq!(
            spec.backends[1].virtual_service.virtual_service_ref.namespace.as_deref(),
            Some("shared")
        );
    }

    #[test]
    fn test_cloud_map_service_discovery() {
        let json = r#"{
            "serviceDiscovery": {
                "awsCloudMap": {
                    "namespaceName": "bookinfo.local",
                    "serviceName": "reviews",
                    "attributes": [{"key": "version", "value": "v1"}]
                }
            }
        }"#;
        let spec: VirtualNodeSpec = serde_json::from_str(json).unwrap();
        let cloud_map = spec.service_discovery.unwrap().cloud_map.unwrap();
        assert_eq!(cloud_map.namespace_name, "bookinfo.local");
        assert_eq!(cloud_map.service_name, "reviews");
        assert_eq!(cloud_map.attributes[0].key, "version");
    }
}
