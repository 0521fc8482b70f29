//! Routes of a virtual router
//!
//! Routes are declared inline on the router but live remotely as separate
//! children. The remote set is matched against the declared set by name.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use tracing::info;

use super::{ChildStatus, EngineContext};
use crate::error::Result;
use crate::events::reasons;
use crate::remote::equality::specs_equal;
use crate::remote::{RemoteKind, RemoteLocator, RemoteSpec};

/// Make the routes under `router` match `desired`.
///
/// Returns the remote identifier of every declared route.
pub(super) async fn converge(
    ctx: &EngineContext,
    owner: &ObjectReference,
    router: &RemoteLocator,
    desired: BTreeMap<String, RemoteSpec>,
) -> Result<ChildStatus> {
    let existing: BTreeSet<String> = ctx
        .remote
        .list_children(router, RemoteKind::Route)
        .await?
        .into_iter()
        .collect();

    let mut routes = ChildStatus::new();
    for (name, spec) in &desired {
        let locator = router.child(RemoteKind::Route, name.clone());
        let route = if existing.contains(name) {
            let actual = ctx.remote.describe(&locator).await?;
            if specs_equal(spec, &actual.spec, &[]) {
                actual
            } else if !ctx.is_controlled(&actual) {
                info!(route = %locator, owner = %actual.resource_owner, "Skipping update of route controlled by another account");
                ctx.events
                    .record(
                        owner,
                        EventType::Warning,
                        reasons::ROUTE_NOT_CONTROLLED,
                        &format!("{locator} is controlled by account {}", actual.resource_owner),
                    )
                    .await;
                actual
            } else {
                info!(route = %locator, "Updating route");
                ctx.remote.update(&locator, spec).await?
            }
        } else {
            info!(route = %locator, "Creating route");
            ctx.remote.create(&locator, spec).await?
        };
        routes.insert(name.clone(), route.external_id);
    }

    for name in existing.iter().filter(|name| !desired.contains_key(*name)) {
        delete(ctx, &router.child(RemoteKind::Route, name.clone())).await?;
    }
    Ok(routes)
}

/// Delete every owned route under `router`.
pub(super) async fn delete_all(ctx: &EngineContext, router: &RemoteLocator) -> Result<()> {
    for name in ctx.remote.list_children(router, RemoteKind::Route).await? {
        delete(ctx, &router.child(RemoteKind::Route, name)).await?;
    }
    Ok(())
}

async fn delete(ctx: &EngineContext, locator: &RemoteLocator) -> Result<()> {
    let actual = match ctx.remote.describe(locator).await {
        Ok(actual) => actual,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if !ctx.is_owned(&actual) {
        info!(route = %locator, owner = %actual.resource_owner, "Skipping deletion of route owned by another account");
        return Ok(());
    }
    info!(route = %locator, "Deleting route");
    match ctx.remote.delete(locator).await {
        Err(e) if !e.is_not_found() => Err(e.into()),
        _ => Ok(()),
    }
}
