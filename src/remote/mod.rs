//! Client side of the remote mesh service
//!
//! The engine talks to the service only through [`MeshServiceClient`]. A
//! resource is addressed by a [`RemoteLocator`]: its mesh, the mesh owner
//! when the mesh is shared, an optional parent (the gateway of a gateway
//! route, the router of a route), and its own name.

pub mod equality;
mod http;
pub mod types;

pub use http::HttpMeshServiceClient;
pub use types::RemoteSpec;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Status code the service reports for a converged resource
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// Error code the service uses for a missing resource
pub const NOT_FOUND_CODE: &str = "NotFoundException";

/// Remote resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteKind {
    Mesh,
    VirtualGateway,
    VirtualNode,
    VirtualRouter,
    VirtualService,
    GatewayRoute,
    Route,
}

impl fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Address of a remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocator {
    pub kind: RemoteKind,
    pub mesh_name: String,
    pub mesh_owner: Option<String>,
    pub parent: Option<String>,
    pub name: String,
}

impl RemoteLocator {
    /// Locator of a child resource of `kind` named `name` under this resource
    pub fn child(&self, kind: RemoteKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            mesh_name: self.mesh_name.clone(),
            mesh_owner: self.mesh_owner.clone(),
            parent: Some(self.name.clone()),
            name: name.into(),
        }
    }
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.mesh_name)?;
        if let Some(parent) = &self.parent {
            write!(f, "/{parent}")?;
        }
        if self.kind != RemoteKind::Mesh {
            write!(f, "/{}", self.name)?;
        }
        Ok(())
    }
}

/// Handle of a remote resource as reported by the service
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResource {
    pub external_id: String,
    /// Account owning the resource
    pub resource_owner: String,
    pub spec: RemoteSpec,
    /// Service-side state code, [`STATUS_ACTIVE`] once converged
    pub status: String,
}

impl RemoteResource {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

/// Error returned by the remote service
#[derive(Debug, Clone, Error, PartialEq)]
#[error("remote API error ({code}): {message}")]
pub struct RemoteError {
    /// HTTP status, when the error came from a response
    pub status: Option<u16>,
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: Some(404),
            code: NOT_FOUND_CODE.to_string(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND_CODE || self.status == Some(404)
    }
}

/// Operations on remote mesh resources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MeshServiceClient: Send + Sync {
    /// Fetch a resource. A missing resource is an error with [`RemoteError::is_not_found`].
    async fn describe(&self, locator: &RemoteLocator) -> Result<RemoteResource, RemoteError>;

    async fn create(
        &self,
        locator: &RemoteLocator,
        spec: &RemoteSpec,
    ) -> Result<RemoteResource, RemoteError>;

    async fn update(
        &self,
        locator: &RemoteLocator,
        spec: &RemoteSpec,
    ) -> Result<RemoteResource, RemoteError>;

    async fn delete(&self, locator: &RemoteLocator) -> Result<(), RemoteError>;

    /// Names of the children of `kind` under `parent`
    async fn list_children(
        &self,
        parent: &RemoteLocator,
        kind: RemoteKind,
    ) -> Result<Vec<String>, RemoteError>;
}

/// Describe, mapping "not found" to `None`.
pub async fn describe_optional(
    client: &dyn MeshServiceClient,
    locator: &RemoteLocator,
) -> Result<Option<RemoteResource>, RemoteError> {
    match client.describe(locator).await {
        Ok(resource) => Ok(Some(resource)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator() -> RemoteLocator {
        RemoteLocator {
            kind: RemoteKind::VirtualRouter,
            mesh_name: "global".to_string(),
            mesh_owner: Some("111122223333".to_string()),
            parent: None,
            name: "reviews_bookinfo".to_string(),
        }
    }

    #[test]
    fn test_child_locator_inherits_mesh() {
        let route = locator().child(RemoteKind::Route, "web");
        assert_eq!(route.kind, RemoteKind::Route);
        assert_eq!(route.mesh_owner.as_deref(), Some("111122223333"));
        assert_eq!(route.parent.as_deref(), Some("reviews_bookinfo"));
        assert_eq!(route.to_string(), "Route global/reviews_bookinfo/web");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(RemoteError::not_found("gone").is_not_found());
        assert!(RemoteError::new(NOT_FOUND_CODE, "gone").is_not_found());
        assert!(!RemoteError::new("ThrottlingException", "slow down").is_not_found());
    }

    #[tokio::test]
    async fn test_describe_optional_maps_not_found() {
        let mut client = MockMeshServiceClient::new();
        client
            .expect_describe()
            .returning(|_| Err(RemoteError::not_found("no such router")));
        assert_eq!(describe_optional(&client, &locator()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_describe_optional_passes_other_errors() {
        let mut client = MockMeshServiceClient::new();
        client
            .expect_describe()
            .returning(|_| Err(RemoteError::new("AccessDeniedException", "denied")));
        let err = describe_optional(&client, &locator()).await.unwrap_err();
        assert_eq!(err.code, "AccessDeniedException");
    }
}
