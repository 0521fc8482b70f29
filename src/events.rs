//! Kubernetes Event recording
//!
//! Events are fire-and-forget: a failure to publish is logged and never
//! fails the reconcile that produced it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Publishes Events about declared objects.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(
        &self,
        object: &ObjectReference,
        type_: EventType,
        reason: &str,
        message: &str,
    );
}

/// [`EventRecorder`] wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(
        &self,
        object: &ObjectReference,
        type_: EventType,
        reason: &str,
        message: &str,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: actions::RECONCILE.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, object).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons
pub mod reasons {
    /// Deletion is waiting for objects that still reference this one
    pub const PENDING_MEMBERS_DELETION: &str = "PendingMembersDeletion";
    /// The remote resource is owned by another account and was left alone
    pub const NOT_CONTROLLED: &str = "RemoteResourceNotControlled";
    /// Deletion skipped the remote resource because another account owns it
    pub const NOT_OWNED: &str = "RemoteResourceNotOwned";
    /// A remote route is owned by another account and was left alone
    pub const ROUTE_NOT_CONTROLLED: &str = "RemoteRouteNotControlled";
    /// Reconcile failed and will be retried
    pub const RECONCILE_ERROR: &str = "ReconcileError";
}

pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
}
