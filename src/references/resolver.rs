//! Reference resolution against the object cache
//!
//! The identity check runs against a cached read and is therefore
//! compare-and-use, not linearizable: the target may be deleted and recreated
//! between the check and the remote call that uses it. A stale binding is
//! caught on the next reconcile, which the watch on the target triggers.

use std::sync::Arc;

use kube::ResourceExt;

use super::{object_key_for, Reference};
use crate::crd::MeshObject;
use crate::error::ReferenceError;
use crate::store::{Cached, MeshStore};

/// Resolves typed references to cached objects.
#[derive(Clone)]
pub struct ReferenceResolver {
    store: Arc<MeshStore>,
}

impl ReferenceResolver {
    pub fn new(store: Arc<MeshStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MeshStore> {
        &self.store
    }

    /// Resolve `reference`, made by `referencing`, to its target.
    pub fn resolve<O, R>(
        &self,
        referencing: &O,
        reference: &R,
    ) -> Result<Arc<R::Target>, ReferenceError>
    where
        O: ResourceExt,
        R: Reference,
    {
        let key = object_key_for(referencing.namespace().as_deref(), reference);
        let target = <R::Target as Cached>::cache(&self.store)
            .get(&key)
            .ok_or_else(|| ReferenceError::NotFound {
                kind: R::Target::KIND,
                key: key.to_string(),
            })?;

        if let Some(expected) = reference.identity().filter(|id| !id.is_empty()) {
            let actual = target.uid().unwrap_or_default();
            if actual != expected {
                return Err(ReferenceError::IdentityMismatch {
                    kind: R::Target::KIND,
                    key: key.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        Ok(target)
    }
}
