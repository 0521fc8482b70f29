//! Writes to declared objects: status and finalizers
//!
//! Every write is a JSON merge patch that carries the `resourceVersion` the
//! change was computed from, so a concurrent modification fails with a
//! conflict instead of being overwritten. The controller requeues on conflict.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde_json::{Map, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// Address of a declared object plus the version a write is based on.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTarget {
    pub resource: ApiResource,
    pub namespace: Option<String>,
    pub name: String,
    pub resource_version: Option<String>,
}

impl ObjectTarget {
    pub fn of<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        Self {
            resource: ApiResource::erase::<K>(&()),
            namespace: obj.namespace(),
            name: obj.name_any(),
            resource_version: obj.resource_version(),
        }
    }
}

/// Write access to declared objects.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectWriter: Send + Sync {
    /// Apply a merge patch to the status subresource.
    async fn patch_status(&self, target: &ObjectTarget, status_patch: Value) -> Result<()>;

    /// Replace the finalizer list.
    async fn set_finalizers(&self, target: &ObjectTarget, finalizers: Vec<String>) -> Result<()>;
}

/// [`ObjectWriter`] backed by the Kubernetes API.
pub struct KubeObjectWriter {
    client: Client,
}

impl KubeObjectWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, target: &ObjectTarget) -> Api<DynamicObject> {
        match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &target.resource),
            None => Api::all_with(self.client.clone(), &target.resource),
        }
    }
}

#[async_trait]
impl ObjectWriter for KubeObjectWriter {
    async fn patch_status(&self, target: &ObjectTarget, status_patch: Value) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": target.resource_version },
            "status": status_patch,
        });
        self.api(target)
            .patch_status(&target.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!(kind = %target.resource.kind, name = %target.name, "Patched status");
        Ok(())
    }

    async fn set_finalizers(&self, target: &ObjectTarget, finalizers: Vec<String>) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": target.resource_version,
                "finalizers": finalizers,
            }
        });
        self.api(target)
            .patch(&target.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!(kind = %target.resource.kind, name = %target.name, "Updated finalizers");
        Ok(())
    }
}

/// JSON merge patch turning `old` into `new`. Removed keys become `null`.
pub fn merge_diff(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let mut patch = Map::new();
            for (key, new_value) in new {
                match old.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value) => {
                        patch.insert(key.clone(), merge_diff(old_value, new_value));
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old.keys() {
                if !new.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GatewayRoute, GatewayRouteSpec, Mesh, MeshSpec};
    use serde_json::json;

    #[test]
    fn test_target_of_namespaced_object() {
        let mut gr = GatewayRoute::new("reviews", GatewayRouteSpec::default());
        gr.metadata.namespace = Some("bookinfo".to_string());
        gr.metadata.resource_version = Some("42".to_string());

        let target = ObjectTarget::of(&gr);
        assert_eq!(target.resource.kind, "GatewayRoute");
        assert_eq!(target.resource.group, "appmesh.meshops.io");
        assert_eq!(target.resource.plural, "gatewayroutes");
        assert_eq!(target.namespace.as_deref(), Some("bookinfo"));
        assert_eq!(target.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_target_of_cluster_object() {
        let mesh = Mesh::new("global", MeshSpec::default());
        let target = ObjectTarget::of(&mesh);
        assert!(target.namespace.is_none());
        assert_eq!(target.resource.plural, "meshes");
    }

    #[test]
    fn test_merge_diff_only_changed_fields() {
        let old = json!({"arn": "a", "observedGeneration": 1, "conditions": []});
        let new = json!({"arn": "a", "observedGeneration": 2, "conditions": [{"type": "X"}]});
        assert_eq!(
            merge_diff(&old, &new),
            json!({"observedGeneration": 2, "conditions": [{"type": "X"}]})
        );
    }

    #[test]
    fn test_merge_diff_removes_keys() {
        let old = json!({"routeArns": {"a": "1", "b": "2"}});
        let new = json!({"routeArns": {"a": "1"}});
        assert_eq!(merge_diff(&old, &new), json!({"routeArns": {"b": null}}));

        let old = json!({"arn": "a"});
        let new = json!({});
        assert_eq!(merge_diff(&old, &new), json!({"arn": null}));
    }
}
