//! Finalizer lifecycle around the reconciliation engine
//!
//! Every finalizer change is written on its own and the reconcile ends there:
//! the write bumps the resourceVersion and the resulting watch event drives
//! the next step with a fresh object.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::conditions::{MESH_MEMBERS_FINALIZER, REMOTE_RESOURCES_FINALIZER};
use crate::crd::MeshObject;
use crate::error::Result;
use crate::events::EventRecorder;
use crate::finalizer::MembersFinalizer;
use crate::manager::kinds::{
    GatewayRouteKind, MeshKind, VirtualGatewayKind, VirtualNodeKind, VirtualRouterKind,
    VirtualServiceKind,
};
use crate::manager::{ResourceKind, ResourceManager};
use crate::store::ObjectTarget;

/// A kind run by a controller.
#[async_trait]
pub trait ManagedKind: ResourceKind {
    /// Finalizers every live object of this kind carries
    const FINALIZERS: &'static [&'static str] = &[REMOTE_RESOURCES_FINALIZER];

    /// Hold deletion open while members reference `obj`.
    async fn finalize_members(&self, _members: &MembersFinalizer, _obj: &Self::Object) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ManagedKind for MeshKind {
    const FINALIZERS: &'static [&'static str] = &[MESH_MEMBERS_FINALIZER, REMOTE_RESOURCES_FINALIZER];

    async fn finalize_members(&self, members: &MembersFinalizer, obj: &Self::Object) -> Result<()> {
        members.finalize(obj).await
    }
}

#[async_trait]
impl ManagedKind for VirtualGatewayKind {
    const FINALIZERS: &'static [&'static str] = &[MESH_MEMBERS_FINALIZER, REMOTE_RESOURCES_FINALIZER];

    async fn finalize_members(&self, members: &MembersFinalizer, obj: &Self::Object) -> Result<()> {
        members.finalize(obj).await
    }
}

impl ManagedKind for VirtualNodeKind {}
impl ManagedKind for VirtualRouterKind {}
impl ManagedKind for VirtualServiceKind {}
impl ManagedKind for GatewayRouteKind {}

/// Drives one object through finalizer setup, reconcile and teardown.
pub struct Lifecycle<S: ManagedKind> {
    manager: ResourceManager<S>,
    members: Arc<MembersFinalizer>,
}

impl<S: ManagedKind> Lifecycle<S> {
    pub fn new(manager: ResourceManager<S>, members: Arc<MembersFinalizer>) -> Self {
        Self { manager, members }
    }

    pub fn events(&self) -> &Arc<dyn EventRecorder> {
        &self.manager.context().events
    }

    pub async fn run(&self, obj: &S::Object) -> Result<()> {
        if obj.is_deleting() {
            return self.finalize(obj).await;
        }

        let missing: Vec<&str> = S::FINALIZERS
            .iter()
            .copied()
            .filter(|f| !has_finalizer(obj, f))
            .collect();
        if !missing.is_empty() {
            debug!(kind = S::Object::KIND, name = %obj.name_any(), finalizers = ?missing, "Adding finalizers");
            let mut finalizers = obj.finalizers().to_vec();
            finalizers.extend(missing.into_iter().map(str::to_string));
            return self.set_finalizers(obj, finalizers).await;
        }

        self.manager.reconcile(obj).await
    }

    async fn finalize(&self, obj: &S::Object) -> Result<()> {
        if has_finalizer(obj, MESH_MEMBERS_FINALIZER) {
            self.manager
                .strategy()
                .finalize_members(&self.members, obj)
                .await?;
            return self.remove_finalizer(obj, MESH_MEMBERS_FINALIZER).await;
        }
        if has_finalizer(obj, REMOTE_RESOURCES_FINALIZER) {
            self.manager.cleanup(obj).await?;
            info!(kind = S::Object::KIND, name = %obj.name_any(), "Remote resources cleaned up");
            return self.remove_finalizer(obj, REMOTE_RESOURCES_FINALIZER).await;
        }
        Ok(())
    }

    async fn remove_finalizer(&self, obj: &S::Object, finalizer: &str) -> Result<()> {
        debug!(kind = S::Object::KIND, name = %obj.name_any(), finalizer, "Removing finalizer");
        let finalizers = obj
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect();
        self.set_finalizers(obj, finalizers).await
    }

    async fn set_finalizers(&self, obj: &S::Object, finalizers: Vec<String>) -> Result<()> {
        self.manager
            .context()
            .writer
            .set_finalizers(&ObjectTarget::of(obj), finalizers)
            .await
    }
}

fn has_finalizer<K: MeshObject>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use super::*;
    use crate::error::OperatorError;
    use crate::events::MockEventRecorder;
    use crate::manager::testing::{mesh, virtual_node, Mocks};
    use crate::store::MeshStore;

    const DELAY: Duration = Duration::from_secs(60);

    fn lifecycle<S: ManagedKind>(strategy: S, store: MeshStore, mocks: Mocks) -> Lifecycle<S> {
        let store = Arc::new(store);
        let mut events = MockEventRecorder::new();
        events.expect_record().returning(|_, _, _, _| ());
        let members = MembersFinalizer::new(store.clone(), Arc::new(events), DELAY);
        let ctx = mocks.into_context_shared(store);
        Lifecycle::new(ResourceManager::new(strategy, ctx), Arc::new(members))
    }

    fn deleting<K: MeshObject>(mut obj: K, finalizers: &[&str]) -> K {
        obj.meta_mut().deletion_timestamp = Some(Time(Utc::now()));
        obj.meta_mut().finalizers = Some(finalizers.iter().map(|f| f.to_string()).collect());
        obj
    }

    #[tokio::test]
    async fn test_new_mesh_gets_both_finalizers_before_any_remote_call() {
        let mut mocks = Mocks::new();
        mocks.remote.expect_describe().times(0);
        mocks
            .writer
            .expect_set_finalizers()
            .withf(|target, finalizers| {
                target.name == "global"
                    && target.resource_version.as_deref() == Some("1")
                    && finalizers == &vec![MESH_MEMBERS_FINALIZER.to_string(), REMOTE_RESOURCES_FINALIZER.to_string()]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let lifecycle = lifecycle(MeshKind, MeshStore::new(), mocks);
        lifecycle.run(&mesh("global", "m1", false)).await.unwrap();
    }

    #[tokio::test]
    async fn test_deleting_mesh_with_members_keeps_finalizers() {
        let m = mesh("global", "m1", true);
        let store = MeshStore::new();
        store.virtual_nodes.apply(virtual_node("bookinfo", "reviews", &m, true));

        let mut mocks = Mocks::new();
        mocks.writer.expect_set_finalizers().times(0);
        mocks.remote.expect_delete().times(0);

        let lifecycle = lifecycle(MeshKind, store, mocks);
        let obj = deleting(m, &[MESH_MEMBERS_FINALIZER, REMOTE_RESOURCES_FINALIZER]);
        let err = lifecycle.run(&obj).await.unwrap_err();
        assert!(matches!(err, OperatorError::PendingDependents { .. }));
    }

    #[tokio::test]
    async fn test_deleting_mesh_without_members_drops_members_finalizer_first() {
        let mut mocks = Mocks::new();
        mocks.remote.expect_describe().times(0);
        mocks
            .writer
            .expect_set_finalizers()
            .withf(|_, finalizers| finalizers == &vec![REMOTE_RESOURCES_FINALIZER.to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let lifecycle = lifecycle(MeshKind, MeshStore::new(), mocks);
        let obj = deleting(
            mesh("global", "m1", true),
            &[MESH_MEMBERS_FINALIZER, REMOTE_RESOURCES_FINALIZER],
        );
        lifecycle.run(&obj).await.unwrap();
    }

    #[tokio::test]
    async fn test_deleting_unconverged_node_releases_remote_finalizer() {
        // never converged and its mesh is gone: nothing remote to delete
        let m = mesh("global", "m1", true);
        let mut vn = virtual_node("bookinfo", "reviews", &m, false);
        vn.resource_status_mut().external_id = None;

        let mut mocks = Mocks::new();
        mocks.remote.expect_describe().times(0);
        mocks
            .writer
            .expect_set_finalizers()
            .withf(|_, finalizers| finalizers == &vec!["example.com/other".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));

        let lifecycle = lifecycle(VirtualNodeKind, MeshStore::new(), mocks);
        let obj = deleting(vn, &[REMOTE_RESOURCES_FINALIZER, "example.com/other"]);
        lifecycle.run(&obj).await.unwrap();
    }

    #[tokio::test]
    async fn test_deleted_object_without_our_finalizers_is_left_alone() {
        let mut mocks = Mocks::new();
        mocks.writer.expect_set_finalizers().times(0);
        mocks.remote.expect_describe().times(0);

        let lifecycle = lifecycle(MeshKind, MeshStore::new(), mocks);
        let obj = deleting(mesh("global", "m1", true), &[]);
        lifecycle.run(&obj).await.unwrap();
    }
}
