//! Remote-shaped specs
//!
//! Mirrors of the declared specs with every reference replaced by the remote
//! name of the resolved target.

use serde::{Deserialize, Serialize};

use super::RemoteKind;
use crate::crd::{
    EgressFilter, GrpcGatewayRouteMatch, GrpcRouteMatch, HttpGatewayRouteMatch, HttpRouteMatch,
    Listener, Logging, PortMapping,
};

/// Desired or actual spec of a remote resource
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteSpec {
    Mesh(MeshData),
    VirtualGateway(VirtualGatewayData),
    VirtualNode(VirtualNodeData),
    VirtualRouter(VirtualRouterData),
    VirtualService(VirtualServiceData),
    GatewayRoute(GatewayRouteData),
    Route(RouteData),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_filter: Option<EgressFilter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualGatewayData {
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNodeData {
    #[serde(default)]
    pub listeners: Vec<Listener>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_discovery: Option<ServiceDiscoveryData>,
    #[serde(default)]
    pub backends: Vec<BackendData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDiscoveryData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_cloud_map: Option<CloudMapData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudMapData {
    pub namespace_name: String,
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<CloudMapAttributeData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudMapAttributeData {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DnsData {
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendData {
    pub virtual_service: VirtualServiceBackendData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceBackendData {
    pub virtual_service_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterData {
    #[serde(default)]
    pub listeners: Vec<VirtualRouterListenerData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterListenerData {
    pub port_mapping: PortMapping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_node: Option<VirtualNodeProviderData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_router: Option<VirtualRouterProviderData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNodeProviderData {
    pub virtual_node_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterProviderData {
    pub virtual_router_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_route: Option<HttpRouteData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_route: Option<HttpRouteData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_route: Option<GrpcRouteData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_route: Option<TcpRouteData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteData {
    pub r#match: HttpRouteMatch,
    pub action: RouteActionData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteData {
    pub r#match: GrpcRouteMatch,
    pub action: RouteActionData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TcpRouteData {
    pub action: RouteActionData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteActionData {
    #[serde(default)]
    pub weighted_targets: Vec<WeightedTargetData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightedTargetData {
    pub virtual_node: String,
    pub weight: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_route: Option<HttpGatewayRouteData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_route: Option<HttpGatewayRouteData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_route: Option<GrpcGatewayRouteData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpGatewayRouteData {
    pub r#match: HttpGatewayRouteMatch,
    pub action: GatewayRouteActionData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcGatewayRouteData {
    pub r#match: GrpcGatewayRouteMatch,
    pub action: GatewayRouteActionData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteActionData {
    pub target: GatewayRouteTargetData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteTargetData {
    pub virtual_service: GatewayRouteVirtualServiceData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRouteVirtualServiceData {
    pub virtual_service_name: String,
}

impl RemoteSpec {
    /// Parse a spec body returned by the service for a resource of `kind`
    pub fn from_body(kind: RemoteKind, body: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            RemoteKind::Mesh => RemoteSpec::Mesh(serde_json::from_value(body)?),
            RemoteKind::VirtualGateway => RemoteSpec::VirtualGateway(serde_json::from_value(body)?),
            RemoteKind::VirtualNode => RemoteSpec::VirtualNode(serde_json::from_value(body)?),
            RemoteKind::VirtualRouter => RemoteSpec::VirtualRouter(serde_json::from_value(body)?),
            RemoteKind::VirtualService => RemoteSpec::VirtualService(serde_json::from_value(body)?),
            RemoteKind::GatewayRoute => RemoteSpec::GatewayRoute(serde_json::from_value(body)?),
            RemoteKind::Route => RemoteSpec::Route(serde_json::from_value(body)?),
        })
    }

    /// The spec body alone, without the kind tag
    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            RemoteSpec::Mesh(s) => serde_json::to_value(s),
            RemoteSpec::VirtualGateway(s) => serde_json::to_value(s),
            RemoteSpec::VirtualNode(s) => serde_json::to_value(s),
            RemoteSpec::VirtualRouter(s) => serde_json::to_value(s),
            RemoteSpec::VirtualService(s) => serde_json::to_value(s),
            RemoteSpec::GatewayRoute(s) => serde_json::to_value(s),
            RemoteSpec::Route(s) => serde_json::to_value(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_strips_kind_tag() {
        let spec = RemoteSpec::VirtualService(VirtualServiceData {
            provider: Some(ProviderData {
                virtual_node: Some(VirtualNodeProviderData {
                    virtual_node_name: "reviews-v1_bookinfo".to_string(),
                }),
                virtual_router: None,
            }),
        });
        let body = spec.body().unwrap();
        assert_eq!(
            body["provider"]["virtualNode"]["virtualNodeName"],
            "reviews-v1_bookinfo"
        );
        assert!(body.get("kind").is_none());
    }

    #[test]
    fn test_from_body_tolerates_missing_collections() {
        let spec = RemoteSpec::from_body(
            RemoteKind::VirtualNode,
            serde_json::json!({"serviceDiscovery": {"dns": {"hostname": "a.b"}}}),
        )
        .unwrap();
        match spec {
            RemoteSpec::VirtualNode(vn) => {
                assert!(vn.listeners.is_empty());
                assert!(vn.backends.is_empty());
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }
}
