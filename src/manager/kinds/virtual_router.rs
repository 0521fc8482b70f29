use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::Resource;

use super::{remote_name, resolve_all, Readiness, Resolved};
use crate::crd::{RouteAction, VirtualNode, VirtualRouter, VirtualRouterStatus};
use crate::error::{OperatorError, Result};
use crate::manager::{routes, ChildStatus, DependencyValidator, EngineContext, ResourceKind};
use crate::remote::types::{
    GrpcRouteData, HttpRouteData, RouteActionData, RouteData, TcpRouteData,
    VirtualRouterData, VirtualRouterListenerData, WeightedTargetData,
};
use crate::remote::{RemoteKind, RemoteLocator, RemoteSpec};

/// Routes are converged as remote children once the router itself exists.
pub struct VirtualRouterKind;

impl VirtualRouterKind {
    fn route_action(
        obj: &VirtualRouter,
        action: &RouteAction,
        deps: &Resolved<VirtualNode>,
    ) -> Result<RouteActionData> {
        let weighted_targets = action
            .weighted_targets
            .iter()
            .map(|target| {
                Ok(WeightedTargetData {
                    virtual_node: remote_name(deps, obj, &target.virtual_node_ref)?,
                    weight: target.weight,
                    port: target.port,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RouteActionData { weighted_targets })
    }

    /// Desired remote spec of every declared route, by route name
    fn route_specs(obj: &VirtualRouter, deps: &Resolved<VirtualNode>) -> Result<BTreeMap<String, RemoteSpec>> {
        let mut specs = BTreeMap::new();
        for route in &obj.spec.routes {
            let http = |r: &crate::crd::HttpRoute| -> Result<HttpRouteData> {
                Ok(HttpRouteData {
                    r#match: r.r#match.clone(),
                    action: Self::route_action(obj, &r.action, deps)?,
                })
            };
            let data = RouteData {
                priority: route.priority,
                http_route: route.http_route.as_ref().map(http).transpose()?,
                http2_route: route.http2_route.as_ref().map(http).transpose()?,
                grpc_route: route
                    .grpc_route
                    .as_ref()
                    .map(|r| -> Result<GrpcRouteData> {
                        Ok(GrpcRouteData {
                            r#match: r.r#match.clone(),
                            action: Self::route_action(obj, &r.action, deps)?,
                        })
                    })
                    .transpose()?,
                tcp_route: route
                    .tcp_route
                    .as_ref()
                    .map(|r| -> Result<TcpRouteData> {
                        Ok(TcpRouteData {
                            action: Self::route_action(obj, &r.action, deps)?,
                        })
                    })
                    .transpose()?,
            };
            if specs.insert(route.name.clone(), RemoteSpec::Route(data)).is_some() {
                return Err(OperatorError::Configuration(format!(
                    "route {} is declared more than once",
                    route.name
                )));
            }
        }
        Ok(specs)
    }
}

#[async_trait]
impl ResourceKind for VirtualRouterKind {
    type Object = VirtualRouter;
    type Dependencies = Resolved<VirtualNode>;

    const REMOTE_KIND: RemoteKind = RemoteKind::VirtualRouter;

    fn resolve_dependencies(
        &self,
        validator: &DependencyValidator<'_>,
        obj: &VirtualRouter,
    ) -> Result<Resolved<VirtualNode>> {
        resolve_all(validator, obj, obj.virtual_node_refs(), "virtualNodeRef", Readiness::Active)
    }

    fn desired_spec(&self, obj: &VirtualRouter, _deps: &Resolved<VirtualNode>) -> Result<RemoteSpec> {
        let listeners = obj
            .spec
            .listeners
            .iter()
            .map(|l| VirtualRouterListenerData {
                port_mapping: l.port_mapping.clone(),
            })
            .collect();
        Ok(RemoteSpec::VirtualRouter(VirtualRouterData { listeners }))
    }

    async fn converge_children(
        &self,
        ctx: &EngineContext,
        obj: &VirtualRouter,
        locator: &RemoteLocator,
        deps: &Resolved<VirtualNode>,
    ) -> Result<Option<ChildStatus>> {
        let desired = Self::route_specs(obj, deps)?;
        let routes = routes::converge(ctx, &obj.object_ref(&()), locator, desired).await?;
        Ok(Some(routes))
    }

    fn record_children(&self, obj: &mut VirtualRouter, children: ChildStatus) -> bool {
        let status = obj.status.get_or_insert_with(VirtualRouterStatus::default);
        if status.route_arns == children {
            return false;
        }
        status.route_arns = children;
        true
    }

    async fn cleanup_children(&self, ctx: &EngineContext, locator: &RemoteLocator) -> Result<()> {
        routes::delete_all(ctx, locator).await
    }
}
