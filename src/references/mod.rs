//! References between declared objects
//!
//! A reference names its target by name and, for namespaced kinds, an
//! optional namespace that defaults to the referencing object's own. Mesh and
//! VirtualGateway references also carry the target's UID so a reference never
//! silently rebinds to a deleted-and-recreated object of the same name.

mod indexer;
mod resolver;

pub use indexer::{index_key, Extractor, MeshIndexers, ObjectReferenceIndexer};
pub use resolver::ReferenceResolver;

use crate::crd::{
    MeshObject, MeshReference, VirtualGatewayReference, VirtualNodeReference,
    VirtualRouterReference, VirtualServiceReference, Mesh, VirtualGateway, VirtualNode,
    VirtualRouter, VirtualService,
};
use crate::store::{Cached, ObjectKey};

/// A typed pointer to another declared object.
pub trait Reference {
    type Target: MeshObject + Cached;

    fn name(&self) -> &str;

    /// Explicit namespace, if any
    fn namespace(&self) -> Option<&str> {
        None
    }

    /// Identity token the target must carry, if any
    fn identity(&self) -> Option<&str> {
        None
    }
}

/// Cache key a reference points at when made from `referencing_namespace`.
pub fn object_key_for<R: Reference>(referencing_namespace: Option<&str>, reference: &R) -> ObjectKey {
    if !R::Target::NAMESPACED {
        return ObjectKey::cluster(reference.name());
    }
    let namespace = reference
        .namespace()
        .filter(|ns| !ns.is_empty())
        .or(referencing_namespace);
    ObjectKey {
        namespace: namespace.map(str::to_string),
        name: reference.name().to_string(),
    }
}

impl Reference for MeshReference {
    type Target = Mesh;

    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> Option<&str> {
        Some(&self.uid)
    }
}

impl Reference for VirtualGatewayReference {
    type Target = VirtualGateway;

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn identity(&self) -> Option<&str> {
        Some(&self.uid)
    }
}

impl Reference for VirtualNodeReference {
    type Target = VirtualNode;

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl Reference for VirtualServiceReference {
    type Target = VirtualService;

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl Reference for VirtualRouterReference {
    type Target = VirtualRouter;

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}
