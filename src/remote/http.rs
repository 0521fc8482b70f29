//! REST client for the mesh service
//!
//! Layout:
//!
//! ```text
//! GET|POST          /meshes
//! GET|PUT|DELETE    /meshes/{mesh}
//! GET|POST          /meshes/{mesh}/virtualNodes
//! GET|PUT|DELETE    /meshes/{mesh}/virtualNodes/{name}
//! GET|POST          /meshes/{mesh}/virtualRouter/{router}/routes
//! GET|PUT|DELETE    /meshes/{mesh}/virtualRouter/{router}/routes/{name}
//! ```
//!
//! and likewise for virtual gateways, routers, services and gateway routes.
//! The mesh owner travels as the `meshOwner` query parameter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{MeshServiceClient, RemoteError, RemoteKind, RemoteLocator, RemoteResource, RemoteSpec, NOT_FOUND_CODE};
use crate::error::{OperatorError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceDocument {
    metadata: MetadataDocument,
    #[serde(default)]
    spec: Value,
    status: StatusDocument,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    arn: String,
    resource_owner: String,
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocument {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDocument {
    #[serde(default, alias = "__type")]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`MeshServiceClient`] speaking JSON over HTTP.
pub struct HttpMeshServiceClient {
    http: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpMeshServiceClient {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            OperatorError::Configuration(format!("invalid remote endpoint {endpoint:?}: {e}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(OperatorError::Configuration(format!(
                "remote endpoint {endpoint} cannot be used as a base URL"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OperatorError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    fn url(&self, segments: &[&str], mesh_owner: Option<&str>) -> std::result::Result<Url, RemoteError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::new("ValidationException", "endpoint is not a base URL"))?
            .pop_if_empty()
            .extend(segments);
        if let Some(owner) = mesh_owner {
            url.query_pairs_mut().append_pair("meshOwner", owner);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> std::result::Result<reqwest::Response, RemoteError> {
        debug!(%method, %url, "Remote request");
        let mut request = self.http.request(method, url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    async fn resource(
        &self,
        kind: RemoteKind,
        response: reqwest::Response,
    ) -> std::result::Result<RemoteResource, RemoteError> {
        let doc: ResourceDocument = response.json().await.map_err(transport_error)?;
        let spec = RemoteSpec::from_body(kind, doc.spec)
            .map_err(|e| RemoteError::new("SerializationException", e.to_string()))?;
        Ok(RemoteResource {
            external_id: doc.metadata.arn,
            resource_owner: doc.metadata.resource_owner,
            spec,
            status: doc.status.status,
        })
    }
}

#[async_trait]
impl MeshServiceClient for HttpMeshServiceClient {
    async fn describe(&self, locator: &RemoteLocator) -> std::result::Result<RemoteResource, RemoteError> {
        let url = self.url(&resource_path(locator)?, locator.mesh_owner.as_deref())?;
        let response = self.send(Method::GET, url, None).await?;
        self.resource(locator.kind, response).await
    }

    async fn create(
        &self,
        locator: &RemoteLocator,
        spec: &RemoteSpec,
    ) -> std::result::Result<RemoteResource, RemoteError> {
        let url = self.url(&collection_path(locator)?, locator.mesh_owner.as_deref())?;
        let body = serde_json::json!({
            "name": locator.name,
            "spec": spec_body(spec)?,
            "clientToken": client_token(),
        });
        let response = self.send(Method::POST, url, Some(body)).await?;
        self.resource(locator.kind, response).await
    }

    async fn update(
        &self,
        locator: &RemoteLocator,
        spec: &RemoteSpec,
    ) -> std::result::Result<RemoteResource, RemoteError> {
        let url = self.url(&resource_path(locator)?, locator.mesh_owner.as_deref())?;
        let body = serde_json::json!({
            "spec": spec_body(spec)?,
            "clientToken": client_token(),
        });
        let response = self.send(Method::PUT, url, Some(body)).await?;
        self.resource(locator.kind, response).await
    }

    async fn delete(&self, locator: &RemoteLocator) -> std::result::Result<(), RemoteError> {
        let url = self.url(&resource_path(locator)?, locator.mesh_owner.as_deref())?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn list_children(
        &self,
        parent: &RemoteLocator,
        kind: RemoteKind,
    ) -> std::result::Result<Vec<String>, RemoteError> {
        let probe = parent.child(kind, String::new());
        let base = self.url(&collection_path(&probe)?, parent.mesh_owner.as_deref())?;

        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut url = base.clone();
            if let Some(token) = &next_token {
                url.query_pairs_mut().append_pair("nextToken", token);
            }
            let response = self.send(Method::GET, url, None).await?;
            let page: ListDocument = response.json().await.map_err(transport_error)?;
            names.extend(page.items.into_iter().map(|item| item.name));
            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(names)
    }
}

/// Path segments of the collection holding `locator`'s resource
fn collection_path(locator: &RemoteLocator) -> std::result::Result<Vec<&str>, RemoteError> {
    let mesh = locator.mesh_name.as_str();
    let parent = || {
        locator.parent.as_deref().ok_or_else(|| {
            RemoteError::new(
                "ValidationException",
                format!("{} {} requires a parent", locator.kind, locator.name),
            )
        })
    };
    Ok(match locator.kind {
        RemoteKind::Mesh => vec!["meshes"],
        RemoteKind::VirtualGateway => vec!["meshes", mesh, "virtualGateways"],
        RemoteKind::VirtualNode => vec!["meshes", mesh, "virtualNodes"],
        RemoteKind::VirtualRouter => vec!["meshes", mesh, "virtualRouters"],
        RemoteKind::VirtualService => vec!["meshes", mesh, "virtualServices"],
        RemoteKind::GatewayRoute => vec!["meshes", mesh, "virtualGateway", parent()?, "gatewayRoutes"],
        RemoteKind::Route => vec!["meshes", mesh, "virtualRouter", parent()?, "routes"],
    })
}

fn resource_path(locator: &RemoteLocator) -> std::result::Result<Vec<&str>, RemoteError> {
    let mut path = collection_path(locator)?;
    path.push(&locator.name);
    Ok(path)
}

fn spec_body(spec: &RemoteSpec) -> std::result::Result<Value, RemoteError> {
    spec.body()
        .map_err(|e| RemoteError::new("SerializationException", e.to_string()))
}

fn client_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError {
        status: err.status().map(|s| s.as_u16()),
        code: "TransportError".to_string(),
        message: err.to_string(),
    }
}

async fn error_from_response(response: reqwest::Response) -> RemoteError {
    let status = response.status();
    let header_code = response
        .headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(':').next().unwrap_or(v).to_string());
    let doc: ErrorDocument = response.json().await.unwrap_or_default();

    let code = header_code.or(doc.code).unwrap_or_else(|| {
        if status == StatusCode::NOT_FOUND {
            NOT_FOUND_CODE.to_string()
        } else {
            format!("Http{}", status.as_u16())
        }
    });
    RemoteError {
        status: Some(status.as_u16()),
        code,
        message: doc
            .message
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string()),
    }
}
