//! Custom Resource Definitions for the mesh topology
//!
//! `Mesh` is cluster-scoped; every other kind lives in a namespace and points
//! at its mesh through `meshRef`.

mod gateway_route;
mod mesh;
mod references;
mod types;
mod virtual_gateway;
mod virtual_node;
mod virtual_router;
mod virtual_service;

pub use gateway_route::*;
pub use mesh::*;
pub use references::*;
pub use types::*;
pub use virtual_gateway::*;
pub use virtual_node::*;
pub use virtual_router::*;
pub use virtual_service::*;

use std::fmt::Debug;

use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::conditions::Conditions;

/// API group of every kind
pub const API_GROUP: &str = "appmesh.meshops.io";
/// API version of every kind
pub const API_VERSION: &str = "v1beta1";

/// Status common to every kind
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Identifier of the remote resource
    #[serde(rename = "arn", default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Generation most recently converged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Conditions,
}

/// Behaviour shared by every declared mesh resource.
pub trait MeshObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Kind name, also the referent-kind suffix of index keys
    const KIND: &'static str;
    /// Condition type reporting remote convergence
    const ACTIVE_CONDITION: &'static str;
    /// Whether objects of this kind live in a namespace
    const NAMESPACED: bool = true;

    /// Name of the remote resource, defaulted from the object name when unset
    fn external_name(&self) -> String;

    /// Mesh this object belongs to; `None` for the mesh itself
    fn mesh_ref(&self) -> Option<&MeshReference>;

    fn resource_status(&self) -> Option<&ResourceStatus>;

    /// Mutable status, created empty when absent
    fn resource_status_mut(&mut self) -> &mut ResourceStatus;

    fn external_id(&self) -> Option<&str> {
        self.resource_status()
            .and_then(|s| s.external_id.as_deref())
    }

    fn is_active(&self) -> bool {
        self.resource_status()
            .is_some_and(|s| s.conditions.is_true(Self::ACTIVE_CONDITION))
    }

    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}

/// `<name>_<namespace>`, the default external name of most namespaced kinds
pub(crate) fn default_external_name<K: ResourceExt>(obj: &K, separator: char) -> String {
    match obj.namespace() {
        Some(ns) => format!("{}{}{}", obj.name_any(), separator, ns),
        None => obj.name_any(),
    }
}

pub(crate) fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}
