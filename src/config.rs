//! Command line and environment configuration

use std::time::Duration;

use clap::Parser;
use reqwest::Url;

use crate::controllers::ControllerSettings;
use crate::error::{OperatorError, Result};
use crate::leader_election::LeaseConfig;
use crate::manager::EngineSettings;

/// Mesh topology operator
#[derive(Parser, Debug, Clone)]
#[command(name = "mesh-operator")]
#[command(version, about = "Converges mesh topology resources with a managed mesh service")]
pub struct Args {
    /// Account this controller acts for
    #[arg(long, env = "MESH_ACCOUNT_ID")]
    pub account_id: String,

    /// Base URL of the mesh service API
    #[arg(long, env = "MESH_REMOTE_ENDPOINT")]
    pub remote_endpoint: String,

    /// Bearer token for the mesh service API
    #[arg(long, env = "MESH_REMOTE_TOKEN", hide_env_values = true)]
    pub remote_token: Option<String>,

    /// Mesh service request timeout
    #[arg(long, env = "MESH_REMOTE_TIMEOUT_SECS", default_value_t = 30)]
    pub remote_timeout_secs: u64,

    /// Namespace to watch (empty for all namespaces)
    #[arg(long, env = "MESH_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Concurrent reconciles per kind
    #[arg(long, env = "MESH_WORKERS", default_value_t = 3)]
    pub workers: u16,

    /// Deadline of a single reconcile
    #[arg(long, env = "MESH_RECONCILE_TIMEOUT_SECS", default_value_t = 60)]
    pub reconcile_timeout_secs: u64,

    /// Retry delay while a dependency is not active
    #[arg(long, env = "MESH_DEPENDENCY_REQUEUE_SECS", default_value_t = 5)]
    pub dependency_requeue_secs: u64,

    /// Retry delay while members block a deletion
    #[arg(long, env = "MESH_MEMBERS_REQUEUE_SECS", default_value_t = 60)]
    pub members_requeue_secs: u64,

    /// First retry delay after a failed reconcile
    #[arg(long, env = "MESH_BACKOFF_BASE_SECS", default_value_t = 1)]
    pub backoff_base_secs: u64,

    /// Longest retry delay after failed reconciles
    #[arg(long, env = "MESH_BACKOFF_MAX_SECS", default_value_t = 300)]
    pub backoff_max_secs: u64,

    /// Enable leader election for HA deployments
    #[arg(long, env = "MESH_LEADER_ELECTION", default_value_t = false)]
    pub leader_election: bool,

    /// Namespace for the leader election Lease (auto-detected if empty)
    #[arg(long, env = "MESH_LEADER_ELECTION_NAMESPACE", default_value = "")]
    pub leader_election_namespace: String,

    /// Name of the leader election Lease
    #[arg(long, env = "MESH_LEADER_ELECTION_LEASE_NAME", default_value = "mesh-operator-leader")]
    pub leader_election_lease_name: String,
}

/// Remote mesh service connection settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub endpoint: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Validated operator configuration
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub remote: RemoteConfig,
    pub engine: EngineSettings,
    pub controllers: ControllerSettings,
    pub members_requeue: Duration,
    /// Lease settings, `None` when leader election is disabled
    pub leader_election: Option<LeaseConfig>,
}

impl TryFrom<Args> for OperatorConfig {
    type Error = OperatorError;

    fn try_from(args: Args) -> Result<Self> {
        let account_id = args.account_id.trim().to_string();
        if account_id.is_empty() {
            return Err(OperatorError::Configuration("account id must not be empty".to_string()));
        }

        let endpoint = Url::parse(&args.remote_endpoint).map_err(|e| {
            OperatorError::Configuration(format!("invalid remote endpoint {:?}: {e}", args.remote_endpoint))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(OperatorError::Configuration(format!(
                "remote endpoint {} must use http or https",
                endpoint
            )));
        }

        if args.workers == 0 {
            return Err(OperatorError::Configuration("workers must be at least 1".to_string()));
        }
        if args.backoff_base_secs > args.backoff_max_secs {
            return Err(OperatorError::Configuration(format!(
                "backoff base ({}s) exceeds backoff max ({}s)",
                args.backoff_base_secs, args.backoff_max_secs
            )));
        }

        let leader_election = args.leader_election.then(|| {
            LeaseConfig::new(
                args.leader_election_lease_name.clone(),
                crate::leader_election::detect_namespace(&args.leader_election_namespace),
            )
        });

        Ok(Self {
            remote: RemoteConfig {
                endpoint,
                token: args.remote_token.filter(|t| !t.is_empty()),
                timeout: Duration::from_secs(args.remote_timeout_secs),
            },
            engine: EngineSettings {
                account_id,
                dependency_requeue: Duration::from_secs(args.dependency_requeue_secs),
            },
            controllers: ControllerSettings {
                namespace: Some(args.namespace).filter(|ns| !ns.is_empty()),
                workers: args.workers,
                reconcile_timeout: Duration::from_secs(args.reconcile_timeout_secs),
                backoff_base: Duration::from_secs(args.backoff_base_secs),
                backoff_max: Duration::from_secs(args.backoff_max_secs),
            },
            members_requeue: Duration::from_secs(args.members_requeue_secs),
            leader_election,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "mesh-operator",
            "--account-id",
            "111122223333",
            "--remote-endpoint",
            "https://mesh.example.com",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::try_from(parse(&[])).unwrap();
        assert_eq!(config.engine.account_id, "111122223333");
        assert_eq!(config.engine.dependency_requeue, Duration::from_secs(5));
        assert_eq!(config.members_requeue, Duration::from_secs(60));
        assert_eq!(config.controllers.workers, 3);
        assert_eq!(config.controllers.namespace, None);
        assert_eq!(config.controllers.reconcile_timeout, Duration::from_secs(60));
        assert_eq!(config.controllers.backoff_base, Duration::from_secs(1));
        assert_eq!(config.controllers.backoff_max, Duration::from_secs(300));
        assert_eq!(config.remote.timeout, Duration::from_secs(30));
        assert!(config.remote.token.is_none());
        assert!(config.leader_election.is_none());
    }

    #[test]
    fn test_namespace_and_leader_election() {
        let config = OperatorConfig::try_from(parse(&[
            "--namespace",
            "bookinfo",
            "--leader-election",
            "--leader-election-namespace",
            "mesh-system",
        ]))
        .unwrap();
        assert_eq!(config.controllers.namespace.as_deref(), Some("bookinfo"));
        let lease = config.leader_election.unwrap();
        assert_eq!(lease.namespace, "mesh-system");
        assert_eq!(lease.name, "mesh-operator-leader");
    }

    #[test]
    fn test_blank_account_rejected() {
        let mut args = parse(&[]);
        args.account_id = "  ".to_string();
        assert!(matches!(
            OperatorConfig::try_from(args),
            Err(OperatorError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        for endpoint in ["not a url", "ftp://mesh.example.com"] {
            let mut args = parse(&[]);
            args.remote_endpoint = endpoint.to_string();
            assert!(
                matches!(OperatorConfig::try_from(args), Err(OperatorError::Configuration(_))),
                "{endpoint} accepted"
            );
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = OperatorConfig::try_from(parse(&["--workers", "0"])).unwrap_err();
        assert!(matches!(err, OperatorError::Configuration(_)));
    }

    #[test]
    fn test_backoff_base_above_max_rejected() {
        let err = OperatorConfig::try_from(parse(&["--backoff-base-secs", "10", "--backoff-max-secs", "5"]))
            .unwrap_err();
        assert!(matches!(err, OperatorError::Configuration(_)));
    }

    #[test]
    fn test_missing_account_is_a_parse_error() {
        assert!(Args::try_parse_from(["mesh-operator", "--remote-endpoint", "https://mesh.example.com"]).is_err());
    }
}
