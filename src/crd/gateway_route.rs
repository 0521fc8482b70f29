//! GatewayRoute Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    default_external_name, non_empty, MeshObject, MeshReference, ResourceStatus,
    VirtualGatewayReference, VirtualServiceReference,
};
use crate::conditions::GATEWAY_ROUTE_ACTIVE;

/// GatewayRoute is the Schema for the gatewayroutes API
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "appmesh.meshops.io",
    version = "v1beta1",
    kind = "GatewayRoute",
    namespaced,
    status = "ResourceStatus",
    shortname = "gr",
    printcolumn = r#"{"name":"ARN","type":"string","jsonPath":".status.arn"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteSpec {
    /// Name of the remote gateway route. Defaults to `<name>_<namespace>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,

    /// Gateway this route is attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_gateway_ref: Option<VirtualGatewayReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_route: Option<HttpGatewayRoute>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_route: Option<HttpGatewayRoute>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_route: Option<GrpcGatewayRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpGatewayRoute {
    pub r#match: HttpGatewayRouteMatch,
    pub action: GatewayRouteAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpGatewayRouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcGatewayRoute {
    pub r#match: GrpcGatewayRouteMatch,
    pub action: GatewayRouteAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcGatewayRouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteAction {
    pub target: GatewayRouteTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteTarget {
    pub virtual_service: GatewayRouteVirtualService,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteVirtualService {
    pub virtual_service_ref: VirtualServiceReference,
}

impl GatewayRoute {
    /// Virtual services targeted by the grpc, http and http2 routes, in that order
    pub fn virtual_service_refs(&self) -> Vec<&VirtualServiceReference> {
        let grpc = self.spec.grpc_route.as_ref().map(|r| &r.action);
        let http = self.spec.http_route.as_ref().map(|r| &r.action);
        let http2 = self.spec.http2_route.as_ref().map(|r| &r.action);
        [grpc, http, http2]
            .into_iter()
            .flatten()
            .map(|a| &a.target.virtual_service.virtual_service_ref)
            .collect()
    }
}

impl MeshObject for GatewayRoute {
    const KIND: &'static str = "GatewayRoute";
    const ACTIVE_CONDITION: &'static str = GATEWAY_ROUTE_ACTIVE;

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
    fn test_virtual_service_refs() {
        let json = r#"{
            "virtualGatewayRef": {"name": "ingress", "uid": "u1"},
            "httpRoute": {
                "match": {"prefix": "/reviews"},
                "action": {"target": {"virtualService": {"virtualServiceRef": {"name": "reviews"}}}}
            },
            "grpcRoute": {
                "match": {"serviceName": "ratings.Ratings"},
                "action": {"target": {"virtualService": {"virtualServiceRef": {"namespace": "data", "name": "ratings"}}}}
            }
        }"#;
        let gr = GatewayRoute::new("reviews", serde_json::from_str(json).unwrap());
        let refs: Vec<&str> = gr
            .virtual_service_refs()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(refs, vec!["ratings", "reviews"]);
    }

    #[test]
    fn test_route_without_targets() {
        let gr = GatewayRoute::new("empty", GatewayRouteSpec::default());
        assert!(gr.virtual_service_refs().is_empty());
    }
}
