//! Middleware orchestrator.
//!
//! Drives the per-request state machine:
//!
//! ```text
//! ENTRY → CLASSIFIED → FILTERED → { PASS | REDIRECT | PROXY | WEBSOCKET | ERROR }
//! ```
//!
//! Phase-one classification always runs, then the optional filter gets a
//! chance to veto or answer the request itself, then phase two decides
//! interception. Non-intercepted requests flow down the host framework's
//! chain untouched.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, Response, StatusCode};
use axum::middleware::{self, Next};
use axum::Router;

use crate::classify::{classify_entry, resolve_intercept, RequestInfo};
use crate::codec;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::{GatewayEvents, LogLevel};
use crate::parser::{BackendParser, RequestContext};
use crate::tunnel::http::{self as http_tunnel, ProxyClient};
use crate::tunnel::websocket;

/// What a request filter decided.
#[derive(Debug)]
pub enum FilterDecision {
    /// Continue into phase-two classification.
    Proceed,
    /// Decline interception; the request passes down the host chain.
    Veto,
    /// The filter answered the request itself.
    Respond(Response<Body>),
}

type FilterFn = dyn Fn(&mut RequestInfo, &Request) -> FilterDecision + Send + Sync;

/// The gateway middleware, assembled once and shared across requests.
pub struct Gateway {
    config: GatewayConfig,
    parser: BackendParser,
    filter: Option<Box<FilterFn>>,
    events: Arc<GatewayEvents>,
}

impl Gateway {
    /// Build a gateway from a config and anything that converts into a
    /// [`BackendParser`] — a full parser or a bare route closure.
    pub fn new(config: GatewayConfig, parser: impl Into<BackendParser>) -> Self {
        let events = Arc::new(GatewayEvents::new(config.log_errors_to_console));
        Self {
            config,
            parser: parser.into(),
            filter: None,
            events,
        }
    }

    /// Install a filter consulted between the classification phases.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&mut RequestInfo, &Request) -> FilterDecision + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Handle to the event channels, for subscribing before [`Gateway::attach`].
    pub fn events(&self) -> Arc<GatewayEvents> {
        self.events.clone()
    }

    /// Wrap a router with the gateway middleware.
    pub fn attach(self, router: Router) -> Router {
        let core = Arc::new(GatewayCore {
            client: http_tunnel::build_client(),
            config: self.config,
            parser: self.parser,
            filter: self.filter,
            events: self.events,
        });
        router.layer(middleware::from_fn_with_state(core, dispatch))
    }
}

async fn dispatch(
    State(core): State<Arc<GatewayCore>>,
    req: Request,
    next: Next,
) -> Response<Body> {
    core.handle(req, next).await
}

struct GatewayCore {
    config: GatewayConfig,
    parser: BackendParser,
    filter: Option<Box<FilterFn>>,
    events: Arc<GatewayEvents>,
    client: ProxyClient,
}

impl GatewayCore {
    async fn handle(&self, req: Request, next: Next) -> Response<Body> {
        let ctx = RequestContext::from_request(&req, &self.config.route_prefix);

        let mut info = match classify_entry(&self.config, &self.parser, &ctx) {
            Ok(info) => info,
            Err(err) => return self.fail(err),
        };

        if let Some(filter) = &self.filter {
            match filter(&mut info, &req) {
                FilterDecision::Proceed => {}
                FilterDecision::Veto => return next.run(req).await,
                FilterDecision::Respond(response) => return response,
            }
        }

        if let Err(err) = resolve_intercept(&self.config, &self.parser, &ctx, &mut info) {
            return self.fail(err);
        }
        if !info.is_gateway_intercept {
            return next.run(req).await;
        }

        tracing::debug!(
            target_id = info.target_id.as_deref().unwrap_or(""),
            host_mode = info.is_gateway_host,
            websocket = info.is_websocket_request,
            "gateway intercept"
        );

        if info.is_websocket_request {
            match websocket::tunnel(self.events.clone(), &info, req).await {
                Ok(response) => response,
                Err(err) => self.fail_websocket(err),
            }
        } else if !info.is_gateway_host && self.config.gateway_host.is_some() {
            // Subdomain-redirect mode is armed only by an explicit gateway
            // host; otherwise route-mode requests proxy in place.
            self.redirect(&ctx, &info)
        } else {
            match http_tunnel::forward(&self.client, &info, req).await {
                Ok(response) => response,
                Err(err) => self.fail(err),
            }
        }
    }

    /// 302 into host mode. The target identity moves into a DNS label so the
    /// proxied origin gets its own cookie and storage scope.
    fn redirect(&self, ctx: &RequestContext, info: &RequestInfo) -> Response<Body> {
        let (Some(url), Some(target_id)) = (info.backend_url.as_ref(), info.target_id.as_deref())
        else {
            return self.fail(GatewayError::Classification(
                "redirect without a classified target".into(),
            ));
        };

        let query = url.query().map(|q| format!("?{q}")).unwrap_or_default();
        let location = format!(
            "{}://{}.{}{}{}",
            ctx.scheme,
            codec::encode(target_id),
            info.gateway_domain_postfix,
            url.path(),
            query,
        );

        match HeaderValue::from_str(&location) {
            Ok(value) => {
                self.events
                    .log(LogLevel::Debug, format!("redirecting to {location}"));
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::FOUND;
                response.headers_mut().insert(LOCATION, value);
                response
            }
            Err(_) => self.fail(GatewayError::Classification(format!(
                "redirect location {location:?} is not a valid header value"
            ))),
        }
    }

    /// Error funnel for the HTTP branches: emit the event, then answer the
    /// mapped status with the mirrored-code JSON body.
    fn fail(&self, err: GatewayError) -> Response<Body> {
        self.events.error(&err);
        let mut response = Response::new(Body::from(err.body().to_string()));
        *response.status_mut() = err.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Error funnel for the websocket branch: the mapped status is written
    /// directly, with a bare `denied` body when the upstream refused the
    /// upgrade. The denial itself was already reported as a WARN.
    fn fail_websocket(&self, err: GatewayError) -> Response<Body> {
        let body = match &err {
            GatewayError::UpgradeDenied(_) => Body::from("denied"),
            _ => {
                self.events.error(&err);
                Body::empty()
            }
        };
        let mut response = Response::new(body);
        *response.status_mut() = err.status();
        response
    }
}
