use std::sync::Arc;

use super::{remote_name, resolve_all, Readiness, Resolved};
use crate::crd::{
    GatewayRoute, GatewayRouteAction, MeshObject, VirtualGateway, VirtualGatewayReference,
    VirtualService,
};
use crate::error::{OperatorError, Result};
use crate::manager::{DependencyValidator, ResourceKind};
use crate::references::ReferenceResolver;
use crate::remote::types::{
    GatewayRouteActionData, GatewayRouteData, GatewayRouteTargetData,
    GatewayRouteVirtualServiceData, GrpcGatewayRouteData, HttpGatewayRouteData,
};
use crate::remote::{RemoteKind, RemoteSpec};
use crate::store::ObjectKey;

/// Gateway routes live under their virtual gateway remotely.
pub struct GatewayRouteKind;

pub struct GatewayRouteDependencies {
    gateway: Arc<VirtualGateway>,
    virtual_services: Resolved<VirtualService>,
}

fn gateway_ref(obj: &GatewayRoute) -> Result<&VirtualGatewayReference> {
    obj.spec.virtual_gateway_ref.as_ref().ok_or_else(|| {
        OperatorError::Configuration(format!(
            "GatewayRoute {} has no virtualGatewayRef",
            ObjectKey::of(obj)
        ))
    })
}

fn action(
    obj: &GatewayRoute,
    action: &GatewayRouteAction,
    deps: &GatewayRouteDependencies,
) -> Result<GatewayRouteActionData> {
    let reference = &action.target.virtual_service.virtual_service_ref;
    Ok(GatewayRouteActionData {
        target: GatewayRouteTargetData {
            virtual_service: GatewayRouteVirtualServiceData {
                virtual_service_name: remote_name(&deps.virtual_services, obj, reference)?,
            },
            port: action.target.port,
        },
    })
}

impl ResourceKind for GatewayRouteKind {
    type Object = GatewayRoute;
    type Dependencies = GatewayRouteDependencies;

    const REMOTE_KIND: RemoteKind = RemoteKind::GatewayRoute;

    fn resolve_dependencies(
        &self,
        validator: &DependencyValidator<'_>,
        obj: &GatewayRoute,
    ) -> Result<GatewayRouteDependencies> {
        let gateway = validator.active(obj, gateway_ref(obj)?, "virtualGatewayRef")?;
        let virtual_services = resolve_all(
            validator,
            obj,
            obj.virtual_service_refs(),
            "virtualServiceRef",
            Readiness::Active,
        )?;
        Ok(GatewayRouteDependencies {
            gateway,
            virtual_services,
        })
    }

    fn parent_name(&self, deps: &GatewayRouteDependencies) -> Option<String> {
        Some(deps.gateway.external_name())
    }

    fn cleanup_parent(&self, resolver: &ReferenceResolver, obj: &GatewayRoute) -> Result<Option<String>> {
        let gateway = resolver
            .resolve(obj, gateway_ref(obj)?)
            .map_err(|e| OperatorError::reference("virtualGatewayRef", e))?;
        Ok(Some(gateway.external_name()))
    }

    fn desired_spec(&self, obj: &GatewayRoute, deps: &GatewayRouteDependencies) -> Result<RemoteSpec> {
        let http = |r: &crate::crd::HttpGatewayRoute| -> Result<HttpGatewayRouteData> {
            Ok(HttpGatewayRouteData {
                r#match: r.r#match.clone(),
                action: action(obj, &r.action, deps)?,
            })
        };
        Ok(RemoteSpec::GatewayRoute(GatewayRouteData {
            priority: obj.spec.priority,
            http_route: obj.spec.http_route.as_ref().map(http).transpose()?,
            http2_route: obj.spec.http2_route.as_ref().map(http).transpose()?,
            grpc_route: obj
                .spec
                .grpc_route
                .as_ref()
                .map(|r| -> Result<GrpcGatewayRouteData> {
                    Ok(GrpcGatewayRouteData {
                        r#match: r.r#match.clone(),
                        action: action(obj, &r.action, deps)?,
                    })
                })
                .transpose()?,
        }))
    }
}
