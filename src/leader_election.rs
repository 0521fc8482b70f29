//! Lease-based leader election
//!
//! Only the holder of the `coordination.k8s.io/v1` Lease runs controllers.
//! Standby replicas block in [`LeaderElector::acquire`] until the holder's
//! lease expires or is released. Writes use `replace`, so the Lease's
//! resourceVersion arbitrates concurrent candidates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::{debug, info, warn};

use crate::error::Result;

const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Namespace for the Lease.
///
/// Priority: explicit argument, then the service account namespace, then `"default"`.
pub fn detect_namespace(explicit: &str) -> String {
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "default".to_string())
}

/// Lease name and timings
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseConfig {
    pub name: String,
    pub namespace: String,
    /// How long a lease stays valid without renewal
    pub lease_duration: Duration,
    pub renew_interval: Duration,
    /// Wait between acquisition attempts
    pub retry_interval: Duration,
}

impl LeaseConfig {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            lease_duration: Duration::from_secs(15),
            renew_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
        }
    }

    fn lease_duration_secs(&self) -> i32 {
        i32::try_from(self.lease_duration.as_secs()).unwrap_or(i32::MAX)
    }
}

/// Whether a lease last renewed per `spec` has lapsed at `now`.
fn is_expired(spec: Option<&LeaseSpec>, default_duration_secs: i32, now: DateTime<Utc>) -> bool {
    let duration_secs = spec
        .and_then(|s| s.lease_duration_seconds)
        .unwrap_or(default_duration_secs);
    match spec.and_then(|s| s.renew_time.as_ref()) {
        Some(MicroTime(renewed)) => {
            now.signed_duration_since(*renewed).num_seconds() > i64::from(duration_secs)
        }
        None => true,
    }
}

fn holder(lease: &Lease) -> Option<&str> {
    lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref())
}

/// Competes for the Lease on behalf of this replica.
pub struct LeaderElector {
    api: Api<Lease>,
    config: LeaseConfig,
    identity: String,
}

impl LeaderElector {
    pub fn new(client: Client, config: LeaseConfig) -> Self {
        let api = Api::<Lease>::namespaced(client, &config.namespace);
        let identity = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("mesh-operator-{:08x}", rand::random::<u32>()));
        info!(identity = %identity, lease = %config.name, namespace = %config.namespace, "Initialized leader elector");
        Self { api, config, identity }
    }

    pub fn renew_interval(&self) -> Duration {
        self.config.renew_interval
    }

    /// Block until the lease is held.
    pub async fn acquire(&self) {
        info!(identity = %self.identity, lease = %self.config.name, "Waiting to acquire leader lease");
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Acquired leader lease");
                    return;
                }
                Ok(false) => debug!(retry = ?self.config.retry_interval, "Lease held by another replica"),
                Err(e) => warn!(error = %e, retry = ?self.config.retry_interval, "Lease acquisition failed"),
            }
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }

    /// Renew the lease. `Ok(false)` means leadership is lost.
    pub async fn renew(&self) -> Result<bool> {
        let lease = self.api.get(&self.config.name).await?;
        if holder(&lease) != Some(self.identity.as_str()) {
            return Ok(false);
        }
        let mut renewed = lease;
        if let Some(spec) = renewed.spec.as_mut() {
            spec.renew_time = Some(MicroTime(Utc::now()));
        }
        let written = self.write(&renewed).await?;
        if written {
            debug!("Renewed leader lease");
        } else {
            warn!("Lease conflict during renewal, leadership lost");
        }
        Ok(written)
    }

    /// Hand the lease back so a standby can take over without waiting for expiry.
    pub async fn release(&self) {
        let lease = match self.api.get(&self.config.name).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(error = %e, "Failed to read lease for release");
                return;
            }
        };
        if holder(&lease) != Some(self.identity.as_str()) {
            debug!("Lease not held by this replica, skipping release");
            return;
        }
        let mut released = lease;
        if let Some(spec) = released.spec.as_mut() {
            spec.holder_identity = None;
        }
        match self.write(&released).await {
            Ok(true) => info!("Released leader lease"),
            Ok(false) => debug!("Lease changed before release"),
            Err(e) => warn!(error = %e, "Failed to release leader lease"),
        }
    }

    async fn try_acquire(&self) -> Result<bool> {
        let now = Utc::now();
        let existing = match self.api.get(&self.config.name).await {
            Ok(lease) => lease,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return self.create(now).await,
            Err(e) => return Err(e.into()),
        };

        let held_by_self = holder(&existing) == Some(self.identity.as_str());
        if !held_by_self && !is_expired(existing.spec.as_ref(), self.config.lease_duration_secs(), now) {
            return Ok(false);
        }
        let claimed = self.claim(&existing, now, !held_by_self);
        self.write(&claimed).await
    }

    /// `existing` rewritten with this replica as holder
    fn claim(&self, existing: &Lease, now: DateTime<Utc>, takeover: bool) -> Lease {
        let previous = existing.spec.as_ref();
        let transitions = previous.and_then(|s| s.lease_transitions).unwrap_or(0);
        let mut claimed = existing.clone();
        claimed.spec = Some(LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.config.lease_duration_secs()),
            acquire_time: if takeover {
                Some(MicroTime(now))
            } else {
                previous.and_then(|s| s.acquire_time.clone())
            },
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(if takeover { transitions + 1 } else { transitions }),
            ..Default::default()
        });
        claimed
    }

    async fn create(&self, now: DateTime<Utc>) -> Result<bool> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.config.name.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(self.config.lease_duration_secs()),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(0),
                ..Default::default()
            }),
        };
        match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the lease; `Ok(false)` on a version conflict.
    async fn write(&self, lease: &Lease) -> Result<bool> {
        match self
            .api
            .replace(&self.config.name, &PostParams::default(), lease)
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
