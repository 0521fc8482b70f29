//! Controllers for the mesh kinds
//!
//! One `kube::runtime::Controller` per kind. The controller's scheduler keeps
//! at most one reconcile in flight per object and coalesces triggers that
//! arrive meanwhile. Prerequisite watches requeue dependents when the
//! prerequisite's Active state flips.

mod backoff;
mod lifecycle;
mod propagation;

pub use backoff::Backoff;
pub use lifecycle::{Lifecycle, ManagedKind};
pub use propagation::{dependents, ActiveStateTracker};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::events::EventType;
use kube::runtime::watcher;
use kube::{Api, Client, Resource};
use tracing::{debug, info, warn};

use crate::crd::{GatewayRoute, Mesh, MeshObject, VirtualGateway, VirtualNode, VirtualRouter, VirtualService};
use crate::error::{OperatorError, Result};
use crate::events::reasons;
use crate::finalizer::MembersFinalizer;
use crate::manager::kinds::{
    GatewayRouteKind, MeshKind, VirtualGatewayKind, VirtualNodeKind, VirtualRouterKind,
    VirtualServiceKind,
};
use crate::manager::{EngineContext, ResourceManager};
use crate::references::{MeshIndexers, ObjectReferenceIndexer};
use crate::store::ObjectKey;

/// Watch timeout (seconds), below the client read timeout.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Scheduling settings shared by every controller
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Namespace watched for namespaced kinds; `None` watches all
    pub namespace: Option<String>,
    /// Concurrent reconciles per kind
    pub workers: u16,
    pub reconcile_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// Api for a namespaced kind, scoped to the watched namespace.
pub fn namespaced_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// State handed to every reconcile of one kind
pub struct KindContext<S: ManagedKind> {
    lifecycle: Lifecycle<S>,
    backoff: Backoff,
    reconcile_timeout: Duration,
}

impl<S: ManagedKind> KindContext<S> {
    pub fn new(lifecycle: Lifecycle<S>, settings: &ControllerSettings) -> Self {
        Self {
            lifecycle,
            backoff: Backoff::new(settings.backoff_base, settings.backoff_max),
            reconcile_timeout: settings.reconcile_timeout,
        }
    }
}

async fn reconcile<S: ManagedKind>(obj: Arc<S::Object>, ctx: Arc<KindContext<S>>) -> Result<Action> {
    let key = ObjectKey::of(obj.as_ref());
    let outcome = match tokio::time::timeout(ctx.reconcile_timeout, ctx.lifecycle.run(&obj)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(OperatorError::Timeout(ctx.reconcile_timeout)),
    };

    match outcome {
        Ok(()) => {
            ctx.backoff.reset(&key);
            Ok(Action::await_change())
        }
        Err(e) => match e.requeue_after() {
            Some(delay) => {
                debug!(kind = S::Object::KIND, key = %key, reason = e.reason(), message = %e, ?delay, "Waiting before retry");
                Ok(Action::requeue(delay))
            }
            None => {
                ctx.lifecycle
                    .events()
                    .record(&obj.object_ref(&()), EventType::Warning, reasons::RECONCILE_ERROR, &e.to_string())
                    .await;
                Err(e)
            }
        },
    }
}

fn error_policy<S: ManagedKind>(obj: Arc<S::Object>, error: &OperatorError, ctx: Arc<KindContext<S>>) -> Action {
    let key = ObjectKey::of(obj.as_ref());
    let delay = if error.is_retryable() {
        ctx.backoff.next_delay(&key)
    } else {
        ctx.backoff.max_delay()
    };
    warn!(
        kind = S::Object::KIND,
        key = %key,
        reason = error.reason(),
        error = %error,
        ?delay,
        "Reconcile failed"
    );
    Action::requeue(delay)
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    kind: &'static str,
) -> impl Fn(std::result::Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", kind),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", kind),
        }
        std::future::ready(())
    }
}

fn watcher_config() -> watcher::Config {
    watcher::Config::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Builds and runs the controller of every kind.
pub struct Controllers {
    client: Client,
    engine: Arc<EngineContext>,
    indexers: MeshIndexers,
    members: Arc<MembersFinalizer>,
    settings: ControllerSettings,
}

impl Controllers {
    pub fn new(
        client: Client,
        engine: Arc<EngineContext>,
        indexers: MeshIndexers,
        members: Arc<MembersFinalizer>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            client,
            engine,
            indexers,
            members,
            settings,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        namespaced_api(self.client.clone(), self.settings.namespace.as_deref())
    }

    fn controller<K: MeshObject>(&self, api: Api<K>) -> Controller<K> {
        Controller::new(api, watcher_config())
            .with_config(controller::Config::default().concurrency(self.settings.workers))
    }

    fn context<S: ManagedKind>(&self, strategy: S) -> Arc<KindContext<S>> {
        let manager = ResourceManager::new(strategy, self.engine.clone());
        Arc::new(KindContext::new(
            Lifecycle::new(manager, self.members.clone()),
            &self.settings,
        ))
    }

    /// Requeue `K` objects referencing a `P` whose Active state flips.
    fn on_flip_of<P, K>(&self, controller: Controller<K>, api: Api<P>, indexer: &ObjectReferenceIndexer<K>) -> Controller<K>
    where
        P: MeshObject,
        K: MeshObject,
    {
        controller.watches(api, watcher_config(), dependents::<P, K>(indexer.clone()))
    }

    /// Run until shutdown.
    pub async fn run(self) {
        let meshes: Api<Mesh> = Api::all(self.client.clone());
        let indexers = &self.indexers;

        let mesh = self.controller(meshes.clone());

        let virtual_gateway = self.controller(self.api::<VirtualGateway>());
        let virtual_gateway = self.on_flip_of(virtual_gateway, meshes.clone(), &indexers.virtual_gateways);

        let virtual_node = self.controller(self.api::<VirtualNode>());
        let virtual_node = self.on_flip_of(virtual_node, meshes.clone(), &indexers.virtual_nodes);

        let virtual_router = self.controller(self.api::<VirtualRouter>());
        let virtual_router = self.on_flip_of(virtual_router, meshes.clone(), &indexers.virtual_routers);
        let virtual_router = self.on_flip_of(virtual_router, self.api::<VirtualNode>(), &indexers.virtual_routers);

        let virtual_service = self.controller(self.api::<VirtualService>());
        let virtual_service = self.on_flip_of(virtual_service, meshes.clone(), &indexers.virtual_services);
        let virtual_service = self.on_flip_of(virtual_service, self.api::<VirtualNode>(), &indexers.virtual_services);
        let virtual_service = self.on_flip_of(virtual_service, self.api::<VirtualRouter>(), &indexers.virtual_services);

        let gateway_route = self.controller(self.api::<GatewayRoute>());
        let gateway_route = self.on_flip_of(gateway_route, meshes, &indexers.gateway_routes);
        let gateway_route = self.on_flip_of(gateway_route, self.api::<VirtualGateway>(), &indexers.gateway_routes);
        let gateway_route = self.on_flip_of(gateway_route, self.api::<VirtualService>(), &indexers.gateway_routes);

        let controllers: Vec<Pin<Box<dyn Future<Output = ()> + Send>>> = vec![
            Box::pin(run_controller(mesh, self.context(MeshKind))),
            Box::pin(run_controller(virtual_gateway, self.context(VirtualGatewayKind))),
            Box::pin(run_controller(virtual_node, self.context(VirtualNodeKind))),
            Box::pin(run_controller(virtual_router, self.context(VirtualRouterKind))),
            Box::pin(run_controller(virtual_service, self.context(VirtualServiceKind))),
            Box::pin(run_controller(gateway_route, self.context(GatewayRouteKind))),
        ];
        futures::future::join_all(controllers).await;
    }
}

async fn run_controller<S: ManagedKind>(controller: Controller<S::Object>, ctx: Arc<KindContext<S>>) {
    info!(kind = S::Object::KIND, "Starting controller");
    controller
        .shutdown_on_signal()
        .run(reconcile::<S>, error_policy::<S>, ctx)
        .for_each(log_reconcile_result(S::Object::KIND))
        .await;
    info!(kind = S::Object::KIND, "Controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{MESH_MEMBERS_FINALIZER, REMOTE_RESOURCES_FINALIZER};
    use crate::events::MockEventRecorder;
    use crate::manager::testing::{mesh, Mocks};
    use crate::remote::RemoteError;
    use crate::store::MeshStore;

    fn settings() -> ControllerSettings {
        ControllerSettings {
            namespace: None,
            workers: 1,
            reconcile_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
        }
    }

    fn context(mocks: Mocks) -> Arc<KindContext<MeshKind>> {
        let store = Arc::new(MeshStore::new());
        let members = MembersFinalizer::new(store.clone(), Arc::new(MockEventRecorder::new()), Duration::from_secs(60));
        let manager = ResourceManager::new(MeshKind, mocks.into_context_shared(store));
        Arc::new(KindContext::new(Lifecycle::new(manager, Arc::new(members)), &settings()))
    }

    fn finalized_mesh() -> Mesh {
        let mut m = mesh("global", "m1", true);
        m.metadata.finalizers = Some(vec![
            MESH_MEMBERS_FINALIZER.to_string(),
            REMOTE_RESOURCES_FINALIZER.to_string(),
        ]);
        m
    }

    #[tokio::test]
    async fn test_remote_failure_goes_to_error_policy_with_growing_delay() {
        let mut mocks = Mocks::new();
        mocks
            .remote
            .expect_describe()
            .returning(|_| Err(RemoteError::new("InternalServerError", "boom")));
        mocks.events.expect_record().returning(|_, _, _, _| ());
        let ctx = context(mocks);
        let obj = Arc::new(finalized_mesh());

        let err = reconcile(obj.clone(), ctx.clone()).await.unwrap_err();
        assert!(matches!(err, OperatorError::Remote(_)));
        assert_eq!(error_policy(obj.clone(), &err, ctx.clone()), Action::requeue(Duration::from_secs(1)));
        assert_eq!(error_policy(obj.clone(), &err, ctx.clone()), Action::requeue(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_failed_reconcile_records_warning_event() {
        let mut mocks = Mocks::new();
        mocks
            .remote
            .expect_describe()
            .returning(|_| Err(RemoteError::new("BadRequestException", "invalid spec")));
        mocks
            .events
            .expect_record()
            .withf(|object, type_, reason, message| {
                object.name.as_deref() == Some("global")
                    && *type_ == EventType::Warning
                    && reason == reasons::RECONCILE_ERROR
                    && message.contains("invalid spec")
            })
            .times(1)
            .returning(|_, _, _, _| ());
        let ctx = context(mocks);

        assert!(reconcile(Arc::new(finalized_mesh()), ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_configuration_error_waits_max_delay() {
        let ctx = context(Mocks::new());
        let obj = Arc::new(finalized_mesh());
        let err = OperatorError::Configuration("bad".to_string());
        assert_eq!(error_policy(obj, &err, ctx), Action::requeue(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_finalizer_setup_succeeds_and_awaits_change() {
        let mut mocks = Mocks::new();
        mocks.writer.expect_set_finalizers().times(1).returning(|_, _| Ok(()));
        let ctx = context(mocks);

        let action = reconcile(Arc::new(mesh("global", "m1", false)), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }
}
