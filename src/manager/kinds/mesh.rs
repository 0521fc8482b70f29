use crate::crd::Mesh;
use crate::error::Result;
use crate::manager::{DependencyValidator, MeshScope, ResourceKind};
use crate::references::ReferenceResolver;
use crate::remote::types::MeshData;
use crate::remote::{RemoteKind, RemoteSpec};

/// The mesh is addressed by its own name and never depends on anything.
pub struct MeshKind;

impl ResourceKind for MeshKind {
    type Object = Mesh;
    type Dependencies = ();

    const REMOTE_KIND: RemoteKind = RemoteKind::Mesh;

    fn mesh_scope(&self, _resolver: &ReferenceResolver, obj: &Mesh) -> Result<MeshScope> {
        Ok(MeshScope::for_mesh(obj))
    }

    fn resolve_dependencies(&self, _validator: &DependencyValidator<'_>, _obj: &Mesh) -> Result<()> {
        Ok(())
    }

    fn desired_spec(&self, obj: &Mesh, _deps: &()) -> Result<RemoteSpec> {
        Ok(RemoteSpec::Mesh(MeshData {
            egress_filter: obj.spec.egress_filter.clone(),
        }))
    }
}
