//! Error types for the mesh operator

use std::time::Duration;

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Failure to resolve a reference to a declared object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// No object of the referenced kind exists under the effective key
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    /// An object exists under the key but it is not the one the reference was bound to
    #[error("{kind} {key} has uid {actual}, reference expects {expected}")]
    IdentityMismatch {
        kind: &'static str,
        key: String,
        expected: String,
        actual: String,
    },
}

/// Errors that can occur during operator operations
#[derive(Debug, Error)]
pub enum OperatorError {
    /// A required field or reference is missing or invalid. Needs user correction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A reference could not be resolved
    #[error("failed to resolve {context}: {source}")]
    Reference {
        context: String,
        #[source]
        source: ReferenceError,
    },

    /// A dependency exists but is not active yet
    #[error("dependency not ready: {message}")]
    DependencyNotReady {
        message: String,
        requeue_after: Duration,
    },

    /// A referenced object belongs to a different mesh
    #[error("membership error: {0}")]
    Membership(String),

    /// Deletion is held open while dependents still reference the object
    #[error("pending dependents: {message}")]
    PendingDependents {
        message: String,
        requeue_after: Duration,
    },

    /// Remote mesh service error, passed through unmodified
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The reconcile exceeded its deadline
    #[error("reconcile timed out after {0:?}")]
    Timeout(Duration),
}

impl OperatorError {
    pub fn reference(context: impl Into<String>, source: ReferenceError) -> Self {
        OperatorError::Reference {
            context: context.into(),
            source,
        }
    }

    pub fn dependency_not_ready(message: impl Into<String>, requeue_after: Duration) -> Self {
        OperatorError::DependencyNotReady {
            message: message.into(),
            requeue_after,
        }
    }

    /// Fixed requeue delay for expected transient states, `None` for real failures.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            OperatorError::DependencyNotReady { requeue_after, .. }
            | OperatorError::PendingDependents { requeue_after, .. } => Some(*requeue_after),
            _ => None,
        }
    }

    /// Whether retrying without user intervention can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            OperatorError::Configuration(_) | OperatorError::Membership(_)
        )
    }

    /// Short machine-readable reason used for events and condition reasons.
    pub fn reason(&self) -> &'static str {
        match self {
            OperatorError::Configuration(_) => "ConfigurationError",
            OperatorError::Reference { source, .. } => match source {
                ReferenceError::NotFound { .. } => "ReferenceNotFound",
                ReferenceError::IdentityMismatch { .. } => "ReferenceIdentityMismatch",
            },
            OperatorError::DependencyNotReady { .. } => "DependencyNotReady",
            OperatorError::Membership(_) => "MembershipError",
            OperatorError::PendingDependents { .. } => "PendingDependents",
            OperatorError::Remote(_) => "RemoteAPIError",
            OperatorError::KubeApi(_) => "KubeAPIError",
            OperatorError::Serialization(_) => "SerializationError",
            OperatorError::Timeout(_) => "Timeout",
        }
    }
}
