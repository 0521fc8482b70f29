//! Mesh Topology Operator
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! mesh-operator --account-id 111122223333 --remote-endpoint https://mesh.example.com
//!
//! # Run with custom log level
//! RUST_LOG=debug mesh-operator
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use clap::Parser;
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use mesh_operator::config::{Args, OperatorConfig};
use mesh_operator::controllers::{namespaced_api, Controllers};
use mesh_operator::crd::{GatewayRoute, Mesh, VirtualGateway, VirtualNode, VirtualRouter, VirtualService};
use mesh_operator::events::KubeEventRecorder;
use mesh_operator::finalizer::MembersFinalizer;
use mesh_operator::leader_election::LeaderElector;
use mesh_operator::manager::EngineContext;
use mesh_operator::references::{MeshIndexers, ReferenceResolver};
use mesh_operator::remote::HttpMeshServiceClient;
use mesh_operator::store::{informer, KubeObjectWriter, MeshStore};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONTROLLER_NAME: &str = "mesh-operator";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = OperatorConfig::try_from(Args::parse())?;

    info!(
        account_id = %config.engine.account_id,
        remote_endpoint = %config.remote.endpoint,
        namespace = config.controllers.namespace.as_deref().unwrap_or("all"),
        workers = config.controllers.workers,
        leader_election = config.leader_election.is_some(),
        "Starting mesh operator"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Controllers only start once the lease is held
    let elector = match config.leader_election.clone() {
        Some(lease) => {
            let elector = LeaderElector::new(client.clone(), lease);
            elector.acquire().await;
            Some(Arc::new(elector))
        }
        None => None,
    };

    let store = Arc::new(MeshStore::new());
    let indexers = MeshIndexers::setup(&store)?;

    let namespace = config.controllers.namespace.as_deref();
    let informers: Vec<Pin<Box<dyn Future<Output = ()> + Send>>> = vec![
        Box::pin(informer::run(Api::<Mesh>::all(client.clone()), store.meshes.clone(), "Mesh")),
        Box::pin(informer::run(
            namespaced_api::<VirtualGateway>(client.clone(), namespace),
            store.virtual_gateways.clone(),
            "VirtualGateway",
        )),
        Box::pin(informer::run(
            namespaced_api::<VirtualNode>(client.clone(), namespace),
            store.virtual_nodes.clone(),
            "VirtualNode",
        )),
        Box::pin(informer::run(
            namespaced_api::<VirtualRouter>(client.clone(), namespace),
            store.virtual_routers.clone(),
            "VirtualRouter",
        )),
        Box::pin(informer::run(
            namespaced_api::<VirtualService>(client.clone(), namespace),
            store.virtual_services.clone(),
            "VirtualService",
        )),
        Box::pin(informer::run(
            namespaced_api::<GatewayRoute>(client.clone(), namespace),
            store.gateway_routes.clone(),
            "GatewayRoute",
        )),
        // Namespace labels back MembershipDesignator for admission-time callers
        Box::pin(informer::run(
            Api::<Namespace>::all(client.clone()),
            store.namespaces.clone(),
            "Namespace",
        )),
    ];
    let informers_handle = tokio::spawn(futures::future::join_all(informers));

    info!("Waiting for caches to sync");
    store.wait_ready().await;
    info!("Caches synced");

    let events = Arc::new(KubeEventRecorder::new(client.clone(), CONTROLLER_NAME));
    let remote = HttpMeshServiceClient::new(
        config.remote.endpoint.as_str(),
        config.remote.token.clone(),
        config.remote.timeout,
    )?;
    let engine = Arc::new(EngineContext {
        resolver: ReferenceResolver::new(store.clone()),
        remote: Arc::new(remote),
        writer: Arc::new(KubeObjectWriter::new(client.clone())),
        events: events.clone(),
        settings: config.engine.clone(),
    });
    let members = Arc::new(MembersFinalizer::new(store.clone(), events, config.members_requeue));

    let controllers = Controllers::new(client.clone(), engine, indexers, members, config.controllers.clone());
    let controllers_handle = tokio::spawn(controllers.run());

    // Periodic lease renewal (no-op future when leader election is disabled)
    let elector_for_renew = elector.clone();
    let renew_handle = tokio::spawn(async move {
        match elector_for_renew {
            Some(e) => loop {
                tokio::time::sleep(e.renew_interval()).await;
                match e.renew().await {
                    Ok(true) => {}
                    Ok(false) => {
                        error!("Lost leader lease");
                        break;
                    }
                    Err(err) => {
                        error!(error = %err, "Failed to renew leader lease");
                        break;
                    }
                }
            },
            None => std::future::pending::<()>().await,
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = controllers_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller task failed");
            }
        }
        result = informers_handle => {
            if let Err(e) = result {
                error!(error = %e, "Informer task failed");
            }
        }
        _ = renew_handle => {
            error!("Leader lease lost, initiating shutdown");
        }
    }

    if let Some(e) = &elector {
        e.release().await;
    }

    info!("Mesh operator shutting down");
    Ok(())
}
