//! Pluggable backend parser.
//!
//! A [`BackendParser`] is a bundle of four optional callbacks that derive the
//! upstream URL, protocol and method from an incoming request. Deployments
//! usually supply just the route callback; everything left unset falls back
//! to the documented defaults. A bare closure can stand in for a full parser
//! through [`RouteResolver`], which lifts it into a parser whose route slot
//! is that closure.

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{HeaderMap, Method, Request, Uri};
use url::Url;

use crate::error::GatewayError;

/// Read-only snapshot of the parts of a request the parsers may consult.
///
/// Owned by the orchestrator for the lifetime of one request; callbacks
/// borrow it and never see the request body.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    /// Scheme the request arrived on. Server-side requests usually carry no
    /// scheme in their URI, in which case this is `http`.
    pub scheme: String,
    /// Value of the `Host` header, if one was sent.
    pub host: Option<String>,
    pub headers: HeaderMap,
    /// Mount prefix the route parser strips before reading a target out of
    /// the path.
    pub route_prefix: String,
}

impl RequestContext {
    pub fn from_request(req: &Request<Body>, route_prefix: &str) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            scheme: req.uri().scheme_str().unwrap_or("http").to_string(),
            host: req
                .headers()
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            headers: req.headers().clone(),
            route_prefix: route_prefix.to_string(),
        }
    }

    /// Path plus query exactly as the client sent them.
    pub fn original_url(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }
}

/// Anything that can resolve a backend URL from a route.
///
/// Implemented for every matching closure, so `Gateway::new(config, |ctx| ...)`
/// works without constructing a parser by hand.
pub trait RouteResolver: Send + Sync + 'static {
    /// Derive the backend URL from the request, or `None` to decline
    /// interception.
    fn resolve_route(&self, ctx: &RequestContext) -> Option<Url>;
}

impl<F> RouteResolver for F
where
    F: Fn(&RequestContext) -> Option<Url> + Send + Sync + 'static,
{
    fn resolve_route(&self, ctx: &RequestContext) -> Option<Url> {
        self(ctx)
    }
}

type UrlFromIdFn = dyn Fn(&RequestContext, &str) -> Result<Url, GatewayError> + Send + Sync;
type UrlFromRouteFn = dyn Fn(&RequestContext) -> Option<Url> + Send + Sync;
type ProtocolFn = dyn Fn(&RequestContext) -> String + Send + Sync;
type MethodFn = dyn Fn(&RequestContext) -> Method + Send + Sync;

/// Strategy bundle deriving backend URL, protocol and method per request.
///
/// Constructed once per middleware and shared across requests; never mutated
/// after construction.
#[derive(Default)]
pub struct BackendParser {
    url_from_id: Option<Box<UrlFromIdFn>>,
    url_from_route: Option<Box<UrlFromRouteFn>>,
    protocol: Option<Box<ProtocolFn>>,
    method: Option<Box<MethodFn>>,
}

impl BackendParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how a decoded target id resolves to a backend URL.
    pub fn url_from_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &str) -> Result<Url, GatewayError> + Send + Sync + 'static,
    {
        self.url_from_id = Some(Box::new(f));
        self
    }

    /// Override how a routed request resolves to a backend URL.
    pub fn url_from_route<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Option<Url> + Send + Sync + 'static,
    {
        self.url_from_route = Some(Box::new(f));
        self
    }

    /// Override the upstream protocol derivation.
    pub fn protocol<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        self.protocol = Some(Box::new(f));
        self
    }

    /// Override the upstream method derivation.
    pub fn method<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Method + Send + Sync + 'static,
    {
        self.method = Some(Box::new(f));
        self
    }

    /// Resolve the backend URL for a subdomain-encoded target id.
    ///
    /// Default: `<scheme>://<target_id><original path and query>`.
    pub fn parse_url_from_id(
        &self,
        ctx: &RequestContext,
        target_id: &str,
    ) -> Result<Url, GatewayError> {
        match &self.url_from_id {
            Some(f) => f(ctx, target_id),
            None => {
                let raw = format!("{}://{}{}", ctx.scheme, target_id, ctx.original_url());
                Url::parse(&raw).map_err(|e| {
                    GatewayError::Classification(format!("invalid target id url {raw:?}: {e}"))
                })
            }
        }
    }

    /// Resolve the backend URL from the request path, or decline.
    ///
    /// Default: strip the mount prefix, read the remainder as
    /// `<scheme>://<remainder>`. Anything unparsable declines interception.
    pub fn parse_url_from_route(&self, ctx: &RequestContext) -> Option<Url> {
        match &self.url_from_route {
            Some(f) => f(ctx),
            None => {
                let original = ctx.original_url();
                let rest = original.strip_prefix(ctx.route_prefix.as_str())?;
                let rest = rest.trim_start_matches('/');
                if rest.is_empty() {
                    return None;
                }
                Url::parse(&format!("{}://{}", ctx.scheme, rest)).ok()
            }
        }
    }

    /// Upstream protocol before force overrides. Default: the request scheme.
    pub fn parse_protocol(&self, ctx: &RequestContext) -> String {
        match &self.protocol {
            Some(f) => f(ctx),
            None => ctx.scheme.clone(),
        }
    }

    /// Upstream method. Default: the request method.
    pub fn parse_method(&self, ctx: &RequestContext) -> Method {
        match &self.method {
            Some(f) => f(ctx),
            None => ctx.method.clone(),
        }
    }
}

impl std::fmt::Debug for BackendParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendParser")
            .field("url_from_id", &self.url_from_id.is_some())
            .field("url_from_route", &self.url_from_route.is_some())
            .field("protocol", &self.protocol.is_some())
            .field("method", &self.method.is_some())
            .finish()
    }
}

impl<T: RouteResolver> From<T> for BackendParser {
    fn from(resolver: T) -> Self {
        BackendParser::default().url_from_route(move |ctx| resolver.resolve_route(ctx))
    }
}
