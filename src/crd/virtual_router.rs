//! VirtualRouter Custom Resource Definition
//!
//! Routes are declared inline on the router and mirrored as separate remote
//! resources underneath it.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    default_external_name, non_empty, MeshObject, MeshReference, PortMapping, ResourceStatus,
    VirtualNodeReference,
};
use crate::conditions::VIRTUAL_ROUTER_ACTIVE;

/// VirtualRouter is the Schema for the virtualrouters API
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "appmesh.meshops.io",
    version = "v1beta1",
    kind = "VirtualRouter",
    namespaced,
    status = "VirtualRouterStatus",
    shortname = "vr",
    printcolumn = r#"{"name":"ARN","type":"string","jsonPath":".status.arn"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterSpec {
    /// Name of the remote virtual router. Defaults to `<name>_<namespace>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_ref: Option<MeshReference>,

    #[serde(default)]
    pub listeners: Vec<VirtualRouterListener>,

    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterListener {
    pub port_mapping: PortMapping,
}

/// A route owned by the router. Exactly one of the route bodies should be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Route name, unique within the router
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_route: Option<HttpRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2_route: Option<HttpRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_route: Option<GrpcRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_route: Option<TcpRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    pub r#match: HttpRouteMatch,
    pub action: RouteAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRoute {
    pub r#match: GrpcRouteMatch,
    pub action: RouteAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TcpRoute {
    pub action: RouteAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteAction {
    pub weighted_targets: Vec<WeightedTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightedTarget {
    pub virtual_node_ref: VirtualNodeReference,
    pub weight: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
}

impl Route {
    /// Action of whichever route body is set
    pub fn action(&self) -> Option<&RouteAction> {
        self.http_route
            .as_ref()
            .map(|r| &r.action)
            .or_else(|| self.http2_route.as_ref().map(|r| &r.action))
            .or_else(|| self.grpc_route.as_ref().map(|r| &r.action))
            .or_else(|| self.tcp_route.as_ref().map(|r| &r.action))
    }
}

/// VirtualRouter status: the common fields plus remote route identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterStatus {
    #[serde(flatten)]
    pub common: ResourceStatus,
    /// Remote route identifier by route name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub route_arns: BTreeMap<String, String>,
}

impl VirtualRouter {
    /// Every virtual node targeted by any route
    pub fn virtual_node_refs(&self) -> impl Iterator<Item = &VirtualNodeReference> {
        self.spec
            .routes
            .iter()
            .filter_map(Route::action)
            .flat_map(|a| a.weighted_targets.iter())
            .map(|t| &t.virtual_node_ref)
    }
}

impl MeshObject for VirtualRouter {
    const KIND: &'static str = "VirtualRouter";
    const ACTIVE_CONDITION: &'static str = VIRTUAL_ROUTER_ACTIVE;

    fn external_name(&self) -> String {
        non_empty(self.spec.aws_name.as_ref()).unwrap_or_else(|| default_external_name(self, '_'))
    }

    fn mesh_ref(&self) -> Option<&MeshReference> {
        self.spec.mesh_ref.as_ref()
    }

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref().map(|s| &s.common)
    }

    fn resource_status_mut(&mut self) -> &mut ResourceStatus {
        &mut self
            .status
            .get_or_insert_with(VirtualRouterStatus::default)
            .common
    }
}
