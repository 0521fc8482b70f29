//! Per-kind strategies for the reconciliation engine

mod gateway_route;
mod mesh;
mod virtual_gateway;
mod virtual_node;
mod virtual_router;
mod virtual_service;

pub use gateway_route::GatewayRouteKind;
pub use mesh::MeshKind;
pub use virtual_gateway::VirtualGatewayKind;
pub use virtual_node::VirtualNodeKind;
pub use virtual_router::VirtualRouterKind;
pub use virtual_service::VirtualServiceKind;

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::ResourceExt;

use super::DependencyValidator;
use crate::crd::MeshObject;
use crate::error::{OperatorError, Result};
use crate::references::{object_key_for, Reference};
use crate::store::ObjectKey;

/// Resolved reference targets keyed by the cache key their references point at
pub type Resolved<K> = BTreeMap<ObjectKey, Arc<K>>;

/// How strictly a set of references is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    /// Same mesh only
    Member,
    /// Same mesh and active
    Active,
}

fn resolve_all<'r, O, R>(
    validator: &DependencyValidator<'_>,
    referencing: &O,
    references: impl IntoIterator<Item = &'r R>,
    field: &str,
    readiness: Readiness,
) -> Result<Resolved<R::Target>>
where
    O: ResourceExt,
    R: Reference + 'r,
{
    let namespace = referencing.namespace();
    let mut resolved = Resolved::new();
    for reference in references {
        let key = object_key_for(namespace.as_deref(), reference);
        if resolved.contains_key(&key) {
            continue;
        }
        let target = match readiness {
            Readiness::Member => validator.member(referencing, reference, field)?,
            Readiness::Active => validator.active(referencing, reference, field)?,
        };
        resolved.insert(key, target);
    }
    Ok(resolved)
}

/// Remote name of a previously resolved reference target
fn remote_name<O, R>(resolved: &Resolved<R::Target>, referencing: &O, reference: &R) -> Result<String>
where
    O: ResourceExt,
    R: Reference,
{
    let key = object_key_for(referencing.namespace().as_deref(), reference);
    resolved
        .get(&key)
        .map(|target| target.external_name())
        .ok_or_else(|| {
            OperatorError::Configuration(format!(
                "{} {key} referenced by {} was not resolved",
                R::Target::KIND,
                referencing.name_any()
            ))
        })
}
