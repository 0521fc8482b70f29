//! Mesh scope and dependency validation

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;

use crate::crd::{non_empty, Mesh, MeshObject};
use crate::error::{OperatorError, Result};
use crate::references::{Reference, ReferenceResolver};
use crate::remote::{RemoteKind, RemoteLocator};
use crate::store::ObjectKey;

/// The remote mesh an object is reconciled in.
#[derive(Debug, Clone)]
pub struct MeshScope {
    /// Remote mesh name
    pub name: String,
    /// Owning account when the mesh is shared
    pub owner: Option<String>,
    /// Resolved mesh object; `None` when reconciling the mesh itself
    mesh: Option<Arc<Mesh>>,
}

impl MeshScope {
    /// Scope of a mesh reconciling itself
    pub fn for_mesh(mesh: &Mesh) -> Self {
        Self {
            name: mesh.external_name(),
            owner: non_empty(mesh.spec.mesh_owner.as_ref()),
            mesh: None,
        }
    }

    /// Scope of a member object, resolved through its `meshRef`
    pub fn for_member<K: MeshObject>(resolver: &ReferenceResolver, obj: &K) -> Result<Self> {
        let reference = obj.mesh_ref().ok_or_else(|| {
            OperatorError::Configuration(format!(
                "{} {} has no meshRef",
                K::KIND,
                ObjectKey::of(obj)
            ))
        })?;
        let mesh = resolver
            .resolve(obj, reference)
            .map_err(|e| OperatorError::reference("meshRef", e))?;
        Ok(Self {
            name: mesh.external_name(),
            owner: non_empty(mesh.spec.mesh_owner.as_ref()),
            mesh: Some(mesh),
        })
    }

    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    pub(super) fn ensure_active(&self, requeue_after: Duration) -> Result<()> {
        match &self.mesh {
            Some(mesh) if !mesh.is_active() => Err(OperatorError::dependency_not_ready(
                format!("mesh {} is not active yet", mesh.name_any()),
                requeue_after,
            )),
            _ => Ok(()),
        }
    }

    pub fn locator(&self, kind: RemoteKind, parent: Option<String>, name: String) -> RemoteLocator {
        RemoteLocator {
            kind,
            mesh_name: self.name.clone(),
            mesh_owner: self.owner.clone(),
            parent,
            name,
        }
    }
}

/// Resolves references made by an object and checks that their targets
/// belong to the object's mesh.
pub struct DependencyValidator<'a> {
    resolver: &'a ReferenceResolver,
    scope: &'a MeshScope,
    requeue_after: Duration,
}

impl<'a> DependencyValidator<'a> {
    pub fn new(resolver: &'a ReferenceResolver, scope: &'a MeshScope, requeue_after: Duration) -> Self {
        Self {
            resolver,
            scope,
            requeue_after,
        }
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        self.resolver
    }

    /// Resolve a reference whose target must belong to the same mesh.
    pub fn member<O, R>(&self, referencing: &O, reference: &R, field: &str) -> Result<Arc<R::Target>>
    where
        O: ResourceExt,
        R: Reference,
    {
        let target = self
            .resolver
            .resolve(referencing, reference)
            .map_err(|e| OperatorError::reference(field, e))?;
        self.ensure_same_mesh(target.as_ref())?;
        Ok(target)
    }

    /// Like [`Self::member`], and the target must also be active.
    pub fn active<O, R>(&self, referencing: &O, reference: &R, field: &str) -> Result<Arc<R::Target>>
    where
        O: ResourceExt,
        R: Reference,
    {
        let target = self.member(referencing, reference, field)?;
        if !target.is_active() {
            return Err(OperatorError::dependency_not_ready(
                format!(
                    "{} {} is not active yet",
                    R::Target::KIND,
                    ObjectKey::of(target.as_ref())
                ),
                self.requeue_after,
            ));
        }
        Ok(target)
    }

    fn ensure_same_mesh<K: MeshObject>(&self, target: &K) -> Result<()> {
        let Some(mesh) = self.scope.mesh() else {
            return Ok(());
        };
        match target.mesh_ref() {
            Some(reference) if mesh.is_referenced_by(reference) => Ok(()),
            _ => Err(OperatorError::Membership(format!(
                "{} {} does not belong to mesh {}",
                K::KIND,
                ObjectKey::of(target),
                mesh.name_any()
            ))),
        }
    }
}
