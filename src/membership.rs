//! Membership designation by label selector
//!
//! Pods and namespaced objects are assigned to a mesh, virtual gateway or
//! virtual node by evaluating each candidate's selectors. The two entry points
//! differ on zero matches: a pod may belong to nothing, a namespaced object
//! must belong to exactly one candidate.
//!
//! Reconciles never designate; admission-time callers do, against the same
//! [`MeshStore`] the controllers read, including its Namespace cache.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use tracing::debug;

use crate::crd::{GatewayRoute, Mesh, MeshObject, VirtualGateway, VirtualNode};
use crate::error::{OperatorError, ReferenceError, Result};
use crate::selector;
use crate::store::{Cached, MeshStore, ObjectKey};

/// A kind other objects can be assigned to by selector.
pub trait Designatable: MeshObject + Cached {
    /// Selects the pods belonging to this object
    fn pod_selector(&self) -> Option<&LabelSelector> {
        None
    }

    /// Selects the namespaces whose objects belong to this object
    fn namespace_selector(&self) -> Option<&LabelSelector> {
        None
    }
}

impl Designatable for Mesh {
    fn namespace_selector(&self) -> Option<&LabelSelector> {
        self.spec.namespace_selector.as_ref()
    }
}

impl Designatable for VirtualGateway {
    fn pod_selector(&self) -> Option<&LabelSelector> {
        self.spec.pod_selector.as_ref()
    }

    fn namespace_selector(&self) -> Option<&LabelSelector> {
        self.spec.namespace_selector.as_ref()
    }
}

impl Designatable for VirtualNode {
    fn pod_selector(&self) -> Option<&LabelSelector> {
        self.spec.pod_selector.as_ref()
    }
}

/// Assigns objects to their designated owner using cached state.
#[derive(Clone)]
pub struct MembershipDesignator {
    store: Arc<MeshStore>,
}

impl MembershipDesignator {
    pub fn new(store: Arc<MeshStore>) -> Self {
        Self { store }
    }

    /// The object of kind `K` in the pod's namespace whose pod selector matches `pod`, if any.
    pub fn designate_for_pod<K: Designatable>(&self, pod: &Pod) -> Result<Option<Arc<K>>> {
        let namespace = pod.namespace();
        let labels = pod.labels();
        let mut candidates = Vec::new();
        for candidate in K::cache(&self.store).list() {
            if candidate.namespace() != namespace {
                continue;
            }
            if selector::matches(candidate.pod_selector(), labels)? {
                candidates.push(candidate);
            }
        }
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            n => Err(OperatorError::Membership(format!(
                "found {n} matching {}s for pod {}: {}",
                K::KIND,
                ObjectKey::of(pod),
                names(&candidates)
            ))),
        }
    }

    /// The object of kind `K` whose namespace selector matches the namespace of `obj`.
    pub fn designate_for_namespaced<K, O>(&self, obj: &O) -> Result<Arc<K>>
    where
        K: Designatable,
        O: ResourceExt,
    {
        let candidates = self.namespace_candidates::<K, O>(obj)?;
        let designated = exactly_one(candidates, || format!("namespace {}", namespace_of(obj)))?;
        if designated.is_deleting() {
            return Err(OperatorError::Membership(format!(
                "{} {} is being deleted and accepts no new members",
                K::KIND,
                designated.name_any()
            )));
        }
        debug!(kind = K::KIND, name = %designated.name_any(), member = %ObjectKey::of(obj), "Designated");
        Ok(designated)
    }

    /// The virtual gateway a gateway route attaches to.
    ///
    /// Candidates are narrowed first by namespace selector and then by each
    /// gateway's route selector, where an unset route selector selects every route.
    pub fn designate_gateway_for_route(&self, route: &GatewayRoute) -> Result<Arc<VirtualGateway>> {
        let candidates = self.namespace_candidates::<VirtualGateway, _>(route)?;
        if candidates.is_empty() {
            return Err(OperatorError::Membership(format!(
                "no VirtualGateway selects namespace {}",
                namespace_of(route)
            )));
        }
        let mut refined = Vec::new();
        for gateway in candidates {
            let selected = match &gateway.spec.gateway_route_selector {
                None => true,
                Some(sel) => selector::selector_matches(sel, route.labels())?,
            };
            if selected {
                refined.push(gateway);
            }
        }
        exactly_one(refined, || format!("gateway route {}", ObjectKey::of(route)))
    }

    fn namespace_candidates<K, O>(&self, obj: &O) -> Result<Vec<Arc<K>>>
    where
        K: Designatable,
        O: ResourceExt,
    {
        let key = ObjectKey::cluster(namespace_of(obj));
        let namespace = self.store.namespaces.get(&key).ok_or_else(|| {
            OperatorError::reference(
                "namespace",
                ReferenceError::NotFound {
                    kind: "Namespace",
                    key: key.to_string(),
                },
            )
        })?;
        let labels = namespace.labels();
        let mut candidates = Vec::new();
        for candidate in K::cache(&self.store).list() {
            if selector::matches(candidate.namespace_selector(), labels)? {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }
}

fn exactly_one<K: MeshObject>(mut candidates: Vec<Arc<K>>, subject: impl Fn() -> String) -> Result<Arc<K>> {
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(OperatorError::Membership(format!(
            "no {} matches {}, expecting exactly one",
            K::KIND,
            subject()
        ))),
        n => Err(OperatorError::Membership(format!(
            "found {n} matching {}s for {}, expecting exactly one: {}",
            K::KIND,
            subject(),
            names(&candidates)
        ))),
    }
}

fn namespace_of<O: ResourceExt>(obj: &O) -> String {
    obj.namespace().unwrap_or_else(|| "default".to_string())
}

fn names<K: ResourceExt>(candidates: &[Arc<K>]) -> String {
    let mut names: Vec<String> = candidates
        .iter()
        .map(|c| ObjectKey::of(c.as_ref()).to_string())
        .collect();
    names.sort();
    names.join(",")
}
