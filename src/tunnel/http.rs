//! HTTP proxy engine.
//!
//! Builds the upstream request from a classified [`RequestInfo`], streams the
//! client body up and relays the upstream status, headers and body back
//! verbatim. Transport is selected by scheme: `https` rides TLS, everything
//! else plain TCP.

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{HeaderValue, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::classify::{backend_authority, RequestInfo};
use crate::error::GatewayError;

/// Shared upstream client; connection pooling lives here.
pub type ProxyClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Body>;

/// Build the upstream client used by every proxied request.
pub fn build_client() -> ProxyClient {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new()).build(https)
}

/// Forward a classified request upstream and relay the response.
pub async fn forward(
    client: &ProxyClient,
    info: &RequestInfo,
    mut req: Request<Body>,
) -> Result<Response<Body>, GatewayError> {
    let url = info.backend_url.as_ref().ok_or_else(|| {
        GatewayError::Classification("intercepted request lost its backend url".into())
    })?;

    // A Host that already points at the backend would bounce the request
    // straight back through the gateway; drop it and let the client fill it
    // from the target URI.
    if host_matches_backend(req.headers().get(HOST), url) {
        req.headers_mut().remove(HOST);
    }

    *req.method_mut() = info.target_method.clone();
    *req.uri_mut() = upstream_uri(url)?;

    tracing::debug!(backend = %url, method = %info.target_method, "forwarding request");

    let response = client
        .request(req)
        .await
        .map_err(GatewayError::from_client_error)?;

    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}

fn host_matches_backend(host: Option<&HeaderValue>, url: &Url) -> bool {
    let authority = backend_authority(url);
    host.and_then(|v| v.to_str().ok())
        .map(|h| h.ends_with(&authority))
        .unwrap_or(false)
}

/// The websocket schemes ride the same transports as their HTTP siblings.
fn upstream_uri(url: &Url) -> Result<Uri, GatewayError> {
    let raw = match url.scheme() {
        "ws" => url.as_str().replacen("ws", "http", 1),
        "wss" => url.as_str().replacen("wss", "https", 1),
        _ => url.as_str().to_string(),
    };
    raw.parse::<Uri>().map_err(|e| {
        GatewayError::Classification(format!("backend url {raw:?} is not a valid uri: {e}"))
    })
}
