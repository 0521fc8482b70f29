//! Status condition bookkeeping
//!
//! Conditions are kept as an ordered list on the wire, but every mutation goes
//! through [`Conditions::upsert`], which treats the list as a map keyed by
//! condition type: at most one entry per type, insertion order preserved,
//! entries never removed.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Active condition types, one per kind
pub const MESH_ACTIVE: &str = "MeshActive";
pub const VIRTUAL_GATEWAY_ACTIVE: &str = "VirtualGatewayActive";
pub const VIRTUAL_NODE_ACTIVE: &str = "VirtualNodeActive";
pub const VIRTUAL_ROUTER_ACTIVE: &str = "VirtualRouterActive";
pub const VIRTUAL_SERVICE_ACTIVE: &str = "VirtualServiceActive";
pub const GATEWAY_ROUTE_ACTIVE: &str = "GatewayRouteActive";

// Finalizer names
pub const REMOTE_RESOURCES_FINALIZER: &str = "appmesh.meshops.io/remote-resources";
pub const MESH_MEMBERS_FINALIZER: &str = "appmesh.meshops.io/mesh-members";

/// Status of a condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn from_bool(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// A single status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Last time the condition's status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Ordered set of conditions, at most one per type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first condition of the given type.
    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.r#type == condition_type)
    }

    /// True when a condition of `condition_type` exists with status `True`.
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.get(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Insert or update the condition of `condition_type`, returning whether anything changed.
    pub fn upsert(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: Option<&str>,
        message: Option<&str>,
    ) -> bool {
        self.upsert_at(condition_type, status, reason, message, Utc::now())
    }

    /// Same as [`Conditions::upsert`] with an explicit transition timestamp.
    pub fn upsert_at(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: Option<&str>,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let reason = non_empty(reason);
        let message = non_empty(message);

        let Some(existing) = self.0.iter_mut().find(|c| c.r#type == condition_type) else {
            self.0.push(Condition {
                r#type: condition_type.to_string(),
                status,
                last_transition_time: Some(timestamp),
                reason: reason.map(str::to_string),
                message: message.map(str::to_string),
            });
            return true;
        };

        let mut changed = false;
        if existing.status != status {
            existing.status = status;
            existing.last_transition_time = Some(timestamp);
            changed = true;
        }
        if non_empty(existing.reason.as_deref()) != reason {
            existing.reason = reason.map(str::to_string);
            changed = true;
        }
        if non_empty(existing.message.as_deref()) != message {
            existing.message = message.map(str::to_string);
            changed = true;
        }
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        Conditions(conditions)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
