//! Spec fragments shared by several kinds
//!
//! These types carry no references to other declared objects, so the remote
//! specs reuse them as-is.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Protocol spoken on a listener or health check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    Http,
    Http2,
    Grpc,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub port: i64,
    pub protocol: PortProtocol,
}

/// Active health check performed by the data plane
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckPolicy {
    pub healthy_threshold: i64,
    pub interval_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Defaults remotely to the listener port when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    pub protocol: PortProtocol,
    pub timeout_millis: i64,
    pub unhealthy_threshold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub port_mapping: PortMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Logging {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_log: Option<AccessLog>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAccessLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileAccessLog {
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_without_health_check() {
        let json = r#"{"portMapping": {"port": 8080, "protocol": "http"}}"#;
        let listener: Listener = serde_json::from_str(json).unwrap();
        assert_eq!(listener.port_mapping.port, 8080);
        assert_eq!(listener.port_mapping.protocol, PortProtocol::Http);
        assert!(listener.health_check.is_none());
    }

    #[test]
    fn test_health_check_port_is_optional() {
        let json = r#"{
            "healthyThreshold": 2,
            "intervalMillis": 5000,
            "protocol": "grpc",
            "timeoutMillis": 2000,
            "unhealthyThreshold": 3
        }"#;
        let hc: HealthCheckPolicy = serde_json::from_str(json).unwrap();
        assert!(hc.port.is_none());
        let back = serde_json::to_value(&hc).unwrap();
        assert!(back.get("port").is_none());
    }
}
