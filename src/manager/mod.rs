//! Resource reconciliation engine
//!
//! [`ResourceManager`] runs the same convergence state machine for every
//! kind. What differs per kind (which references to follow, how to build the
//! remote spec, which fields the service defaults, child resources) lives in
//! a [`ResourceKind`] strategy.
//!
//! Reconcile is strictly ordered and fails fast: mesh, mesh readiness,
//! structural dependencies, describe, create or update, status. Cleanup
//! deletes the remote resource only when this controller's account owns it.

mod dependencies;
pub mod kinds;
mod routes;
#[cfg(test)]
pub(crate) mod testing;

pub use dependencies::{DependencyValidator, MeshScope};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::conditions::ConditionStatus;
use crate::crd::MeshObject;
use crate::error::Result;
use crate::events::{reasons, EventRecorder};
use crate::references::ReferenceResolver;
use crate::remote::equality::specs_equal;
use crate::remote::{
    describe_optional, MeshServiceClient, RemoteKind, RemoteLocator, RemoteResource, RemoteSpec,
};
use crate::store::{merge_diff, ObjectTarget, ObjectWriter};

/// Remote identifiers of child resources, by child name
pub type ChildStatus = BTreeMap<String, String>;

/// Engine settings shared by every kind
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Account this controller acts for
    pub account_id: String,
    /// Delay before retrying when a dependency is not active yet
    pub dependency_requeue: Duration,
}

/// Collaborators of the engine
pub struct EngineContext {
    pub resolver: ReferenceResolver,
    pub remote: Arc<dyn MeshServiceClient>,
    pub writer: Arc<dyn ObjectWriter>,
    pub events: Arc<dyn EventRecorder>,
    pub settings: EngineSettings,
}

impl EngineContext {
    /// The remote resource may be updated by this controller.
    pub fn is_controlled(&self, remote: &RemoteResource) -> bool {
        remote.resource_owner == self.settings.account_id
    }

    /// The remote resource may be deleted by this controller.
    ///
    /// Same as controllership today; kept separate so ownership can later be
    /// granted by tags without granting control.
    pub fn is_owned(&self, remote: &RemoteResource) -> bool {
        self.is_controlled(remote)
    }
}

/// Per-kind behaviour plugged into [`ResourceManager`].
#[async_trait]
pub trait ResourceKind: Send + Sync + 'static {
    type Object: MeshObject;
    type Dependencies: Send + Sync;

    const REMOTE_KIND: RemoteKind;

    /// Spec paths the service defaults when left unset
    const IGNORE_IF_UNSET: &'static [&'static str] = &[];

    /// Mesh the object lives in. Members resolve their `meshRef`.
    fn mesh_scope(&self, resolver: &ReferenceResolver, obj: &Self::Object) -> Result<MeshScope> {
        MeshScope::for_member(resolver, obj)
    }

    /// Resolve and validate every structural dependency beyond the mesh.
    fn resolve_dependencies(
        &self,
        validator: &DependencyValidator<'_>,
        obj: &Self::Object,
    ) -> Result<Self::Dependencies>;

    /// Remote parent name, taken from resolved dependencies
    fn parent_name(&self, _deps: &Self::Dependencies) -> Option<String> {
        None
    }

    /// Remote parent name, resolved without readiness checks for cleanup
    fn cleanup_parent(&self, _resolver: &ReferenceResolver, _obj: &Self::Object) -> Result<Option<String>> {
        Ok(None)
    }

    /// Desired remote spec with every reference replaced by its remote name
    fn desired_spec(&self, obj: &Self::Object, deps: &Self::Dependencies) -> Result<RemoteSpec>;

    /// Converge child resources after the resource itself.
    async fn converge_children(
        &self,
        _ctx: &EngineContext,
        _obj: &Self::Object,
        _locator: &RemoteLocator,
        _deps: &Self::Dependencies,
    ) -> Result<Option<ChildStatus>> {
        Ok(None)
    }

    /// Store child identifiers on the object, returning whether anything changed.
    fn record_children(&self, _obj: &mut Self::Object, _children: ChildStatus) -> bool {
        false
    }

    /// Delete child resources before the resource itself.
    async fn cleanup_children(&self, _ctx: &EngineContext, _locator: &RemoteLocator) -> Result<()> {
        Ok(())
    }
}

/// Reconciliation engine for one kind.
pub struct ResourceManager<S: ResourceKind> {
    strategy: S,
    ctx: Arc<EngineContext>,
}

impl<S: ResourceKind> ResourceManager<S> {
    pub fn new(strategy: S, ctx: Arc<EngineContext>) -> Self {
        Self { strategy, ctx }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Converge the remote resource with `obj` and report back on its status.
    pub async fn reconcile(&self, obj: &S::Object) -> Result<()> {
        let ctx = &*self.ctx;
        let scope = self.strategy.mesh_scope(&ctx.resolver, obj)?;
        scope.ensure_active(ctx.settings.dependency_requeue)?;

        let validator = DependencyValidator::new(&ctx.resolver, &scope, ctx.settings.dependency_requeue);
        let deps = self.strategy.resolve_dependencies(&validator, obj)?;
        let locator = scope.locator(S::REMOTE_KIND, self.strategy.parent_name(&deps), obj.external_name());

        let remote = match describe_optional(ctx.remote.as_ref(), &locator).await? {
            None => {
                let desired = self.strategy.desired_spec(obj, &deps)?;
                info!(kind = S::Object::KIND, name = %obj.name_any(), remote = %locator, "Creating remote resource");
                ctx.remote.create(&locator, &desired).await?
            }
            Some(actual) => {
                let desired = self.strategy.desired_spec(obj, &deps)?;
                self.update_if_needed(obj, &locator, actual, &desired).await?
            }
        };

        let children = self
            .strategy
            .converge_children(ctx, obj, &locator, &deps)
            .await?;
        self.update_status(obj, &remote, children).await
    }

    /// Delete the remote resource if this controller owns it. Idempotent.
    pub async fn cleanup(&self, obj: &S::Object) -> Result<()> {
        let ctx = &*self.ctx;
        let recorded = obj.external_id().is_some();

        let address = self
            .strategy
            .mesh_scope(&ctx.resolver, obj)
            .and_then(|scope| Ok((self.strategy.cleanup_parent(&ctx.resolver, obj)?, scope)));
        let (parent, scope) = match address {
            Ok(address) => address,
            Err(e) if !recorded => {
                debug!(kind = S::Object::KIND, name = %obj.name_any(), error = %e, "Nothing to clean up");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let locator = scope.locator(S::REMOTE_KIND, parent, obj.external_name());

        let actual = match describe_optional(ctx.remote.as_ref(), &locator).await {
            Ok(Some(actual)) => actual,
            Ok(None) => return Ok(()),
            Err(e) if !recorded => {
                debug!(kind = S::Object::KIND, name = %obj.name_any(), error = %e, "Nothing to clean up");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if !ctx.is_owned(&actual) {
            info!(
                kind = S::Object::KIND,
                name = %obj.name_any(),
                owner = %actual.resource_owner,
                "Skipping deletion of remote resource owned by another account"
            );
            self.record_warning(
                obj,
                reasons::NOT_OWNED,
                &format!("{locator} is owned by account {}", actual.resource_owner),
            )
            .await;
            return Ok(());
        }

        self.strategy.cleanup_children(ctx, &locator).await?;
        info!(kind = S::Object::KIND, name = %obj.name_any(), remote = %locator, "Deleting remote resource");
        match ctx.remote.delete(&locator).await {
            Err(e) if !e.is_not_found() => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn update_if_needed(
        &self,
        obj: &S::Object,
        locator: &RemoteLocator,
        actual: RemoteResource,
        desired: &RemoteSpec,
    ) -> Result<RemoteResource> {
        let ctx = &*self.ctx;
        if specs_equal(desired, &actual.spec, S::IGNORE_IF_UNSET) {
            return Ok(actual);
        }
        if !ctx.is_controlled(&actual) {
            info!(
                kind = S::Object::KIND,
                name = %obj.name_any(),
                owner = %actual.resource_owner,
                "Skipping update of remote resource controlled by another account"
            );
            self.record_warning(
                obj,
                reasons::NOT_CONTROLLED,
                &format!("{locator} is controlled by account {}", actual.resource_owner),
            )
            .await;
            return Ok(actual);
        }
        info!(kind = S::Object::KIND, name = %obj.name_any(), remote = %locator, "Updating remote resource");
        Ok(ctx.remote.update(locator, desired).await?)
    }

    async fn update_status(
        &self,
        obj: &S::Object,
        remote: &RemoteResource,
        children: Option<ChildStatus>,
    ) -> Result<()> {
        let mut updated = obj.clone();
        let generation = obj.meta().generation;
        let mut changed = false;
        {
            let status = updated.resource_status_mut();
            if status.external_id.as_deref() != Some(remote.external_id.as_str()) {
                status.external_id = Some(remote.external_id.clone());
                changed = true;
            }
            if status.observed_generation != generation {
                status.observed_generation = generation;
                changed = true;
            }
            let (active, reason) = if remote.is_active() {
                (ConditionStatus::True, None)
            } else {
                (ConditionStatus::False, Some(remote.status.as_str()))
            };
            changed |= status
                .conditions
                .upsert(S::Object::ACTIVE_CONDITION, active, reason, None);
        }
        if let Some(children) = children {
            changed |= self.strategy.record_children(&mut updated, children);
        }
        if !changed {
            return Ok(());
        }

        let patch = merge_diff(&status_json(obj)?, &status_json(&updated)?);
        self.ctx
            .writer
            .patch_status(&ObjectTarget::of(obj), patch)
            .await?;
        debug!(kind = S::Object::KIND, name = %obj.name_any(), "Status updated");
        Ok(())
    }

    async fn record_warning(&self, obj: &S::Object, reason: &str, message: &str) {
        self.ctx
            .events
            .record(&obj.object_ref(&()), EventType::Warning, reason, message)
            .await;
    }
}

fn status_json<K: Serialize>(obj: &K) -> Result<Value> {
    Ok(serde_json::to_value(obj)?
        .get("status")
        .cloned()
        .unwrap_or(Value::Null))
}
