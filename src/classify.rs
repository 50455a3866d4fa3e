//! Request classification.
//!
//! Two deterministic phases over `(config, parser, request)`. Phase one fills
//! in the facts every request has before any user code runs: gateway host
//! derivation, host-mode detection, websocket detection, and the decoded
//! target id when the request arrived on an encoded subdomain. Phase two
//! decides interception and finalizes the backend URL, method and protocol.

use axum::http::header::UPGRADE;
use axum::http::{HeaderMap, Method};
use url::Url;

use crate::codec;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::parser::{BackendParser, RequestContext};

/// Per-request scratch record, created on entry and discarded on completion.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Final decision: should this request be proxied at all?
    pub is_gateway_intercept: bool,
    /// The `Host` header ends with the gateway domain postfix; the target
    /// identity is encoded in the leading label.
    pub is_gateway_host: bool,
    /// Request carries `Upgrade: websocket` or a `Sec-WebSocket-Protocol`
    /// header.
    pub is_websocket_request: bool,
    /// Abstract identifier of the backend, typically `host:port`.
    pub target_id: Option<String>,
    /// Authority at which the gateway itself is reachable.
    pub gateway_host: String,
    /// `<subdomain>.<gateway_host>`.
    pub gateway_domain_postfix: String,
    /// HTTP method to use upstream.
    pub target_method: Method,
    /// Absolute upstream URL.
    pub backend_url: Option<Url>,
}

/// Phase one: derive the core facts. Always runs, before any filter.
pub fn classify_entry(
    config: &GatewayConfig,
    parser: &BackendParser,
    ctx: &RequestContext,
) -> Result<RequestInfo, GatewayError> {
    let host = ctx.host.clone().unwrap_or_default();

    let gateway_host = match &config.gateway_host {
        Some(explicit) => explicit.clone(),
        None => derive_gateway_host(&host, &config.gateway_subdomain),
    };
    let gateway_domain_postfix = format!("{}.{}", config.gateway_subdomain, gateway_host);
    let is_gateway_host = !host.is_empty() && host.ends_with(&gateway_domain_postfix);

    let mut info = RequestInfo {
        is_gateway_intercept: false,
        is_gateway_host,
        is_websocket_request: is_websocket_request(&ctx.headers),
        target_id: None,
        gateway_host,
        gateway_domain_postfix,
        target_method: ctx.method.clone(),
        backend_url: None,
    };

    if info.is_gateway_host {
        let label = host[..host.len() - info.gateway_domain_postfix.len()].trim_end_matches('.');
        let target_id = codec::decode(label);
        info.backend_url = Some(parser.parse_url_from_id(ctx, &target_id)?);
        info.target_id = Some(target_id);
    }

    Ok(info)
}

/// Phase two: decide interception and finalize the backend URL.
///
/// Runs only when no filter vetoed the request.
pub fn resolve_intercept(
    config: &GatewayConfig,
    parser: &BackendParser,
    ctx: &RequestContext,
    info: &mut RequestInfo,
) -> Result<(), GatewayError> {
    info.is_gateway_intercept = true;

    if !info.is_gateway_host {
        info.backend_url = parser.parse_url_from_route(ctx);
    }
    let Some(url) = info.backend_url.as_mut() else {
        info.is_gateway_intercept = false;
        return Ok(());
    };

    if info.target_id.is_none() {
        info.target_id = Some(backend_authority(url));
    }
    info.target_method = parser.parse_method(ctx);

    let mut protocol = parser.parse_protocol(ctx);
    if let Some(forced) = &config.force_protocol {
        protocol = forced.clone();
    }
    if config.force_http {
        protocol = match protocol.as_str() {
            "https" => "http".to_string(),
            "wss" => "ws".to_string(),
            _ => protocol,
        };
    }
    url.set_scheme(&protocol).map_err(|_| {
        GatewayError::Classification(format!("cannot apply scheme {protocol:?} to backend url"))
    })?;

    if info.is_websocket_request {
        strip_websocket_suffix(url);
    }

    Ok(())
}

/// Auto-derive the gateway authority from a `Host` header: everything after
/// the last `.{subdomain}.` separator, or the whole host when the separator
/// never occurs.
fn derive_gateway_host(host: &str, subdomain: &str) -> String {
    let needle = format!(".{subdomain}.");
    match host.rfind(&needle) {
        Some(pos) => host[pos + needle.len()..].to_string(),
        None => host.to_string(),
    }
}

fn is_websocket_request(headers: &HeaderMap) -> bool {
    headers.contains_key("sec-websocket-protocol")
        || headers
            .get(UPGRADE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
}

/// `host:port` form of a backend URL, matching what a client would put in a
/// `Host` header.
pub fn backend_authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

/// Upstream websocket frameworks route upgrade requests through a synthetic
/// trailing `/.websocket` segment; strip it before forwarding.
fn strip_websocket_suffix(url: &mut Url) {
    const SUFFIX: &str = "/.websocket";
    let path = url.path();
    if let Some(stripped) = path.strip_suffix(SUFFIX) {
        let new_path = if stripped.is_empty() {
            "/".to_string()
        } else {
            stripped.to_string()
        };
        url.set_path(&new_path);
    }
}
