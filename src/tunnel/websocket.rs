//! WebSocket upgrade tunnel.
//!
//! Turns a client upgrade request into a raw transparent conduit: the
//! handshake is replayed against the backend over a dedicated connection,
//! the backend's `101` line and headers are relayed to the client, and from
//! then on both sockets are spliced byte-for-byte with no framing in
//! between. A backend that answers anything but `101` gets reported as a
//! denied upgrade.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::classify::{backend_authority, RequestInfo};
use crate::error::{io_error_code, GatewayError};
use crate::events::{GatewayEvents, LogLevel};

/// Byte stream a tunnel can splice over; plain TCP or TLS.
pub trait TunnelIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> TunnelIo for T {}

/// Replay the upgrade handshake upstream and splice both sockets.
///
/// Returns the synthesized `101` response for the client; the actual splice
/// runs in a spawned task once both sides have upgraded.
pub async fn tunnel(
    events: Arc<GatewayEvents>,
    info: &RequestInfo,
    req: Request<Body>,
) -> Result<Response<Body>, GatewayError> {
    let url = info.backend_url.as_ref().ok_or_else(|| {
        GatewayError::Classification("websocket request lost its backend url".into())
    })?;
    let authority = backend_authority(url);

    let io = connect_backend(url).await?;
    let (mut sender, conn) = hyper::client::conn::http1::Builder::new()
        .handshake::<_, Empty<Bytes>>(TokioIo::new(io))
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;

    let conn_events = events.clone();
    tokio::spawn(async move {
        if let Err(err) = conn.with_upgrades().await {
            conn_events.log(
                LogLevel::Debug,
                format!("upstream websocket connection ended: {err}"),
            );
        }
    });

    let upstream_req = build_upgrade_request(info, &req, url, &authority)?;
    let response = sender
        .send_request(upstream_req)
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        events.log(
            LogLevel::Warn,
            format!(
                "upstream {} refused websocket upgrade with status {}",
                authority,
                response.status()
            ),
        );
        return Err(GatewayError::UpgradeDenied(response.status()));
    }

    // The 101 the client sees: status line first, then every header the
    // backend sent, one line per value.
    let mut client_resp = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
    if let Some(headers) = client_resp.headers_mut() {
        for (name, value) in response.headers() {
            headers.append(name.clone(), value.clone());
        }
    }
    let client_resp = client_resp
        .body(Body::empty())
        .map_err(|e| GatewayError::Transport(e.to_string()))?;

    let splice_events = events.clone();
    tokio::spawn(async move {
        let upstream = match hyper::upgrade::on(response).await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                splice_events.error(&GatewayError::Transport(format!(
                    "upstream upgrade failed: {err}"
                )));
                return;
            }
        };
        // Resolves once the 101 above has been flushed to the client.
        let client = match hyper::upgrade::on(req).await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                splice_events.error(&GatewayError::Transport(format!(
                    "client upgrade failed: {err}"
                )));
                return;
            }
        };
        splice(client, upstream, &splice_events).await;
    });

    Ok(client_resp)
}

/// Open the backend socket for the tunnel, with TLS when the scheme asks
/// for it. Idle timeouts stay disabled and Nagle is off: tunneled frames
/// must not sit in a coalescing buffer.
async fn connect_backend(url: &Url) -> Result<Box<dyn TunnelIo>, GatewayError> {
    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::Classification(format!("backend url {url} has no host")))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);

    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| GatewayError::Connect {
            code: io_error_code(&e),
            source: e,
        })?;
    stream.set_nodelay(true).map_err(|e| GatewayError::Connect {
        code: io_error_code(&e),
        source: e,
    })?;

    if matches!(url.scheme(), "https" | "wss") {
        Ok(Box::new(tls_connect(stream, &host).await?))
    } else {
        Ok(Box::new(stream))
    }
}

async fn tls_connect(
    stream: TcpStream,
    host: &str,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, GatewayError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| GatewayError::Classification(format!("invalid tls server name {host:?}")))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| GatewayError::Connect {
            code: io_error_code(&e),
            source: e,
        })
}

/// The upstream handshake request: original upgrade headers, origin-form
/// target, and the same Host rewrite rule as the HTTP engine.
fn build_upgrade_request(
    info: &RequestInfo,
    req: &Request<Body>,
    url: &Url,
    authority: &str,
) -> Result<Request<Empty<Bytes>>, GatewayError> {
    let target = match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    };

    let mut upstream_req = Request::builder()
        .method(info.target_method.clone())
        .uri(target)
        .body(Empty::<Bytes>::new())
        .map_err(|e| GatewayError::Transport(e.to_string()))?;

    for (name, value) in req.headers() {
        if name != HOST {
            upstream_req.headers_mut().append(name.clone(), value.clone());
        }
    }
    let host_value = match req.headers().get(HOST).and_then(|v| v.to_str().ok()) {
        Some(h) if !h.ends_with(authority) => HeaderValue::from_str(h),
        _ => HeaderValue::from_str(authority),
    }
    .map_err(|_| GatewayError::Classification("invalid host header".into()))?;
    upstream_req.headers_mut().insert(HOST, host_value);

    Ok(upstream_req)
}

/// Full-duplex copy until either side closes; half-close propagates as a
/// write shutdown on the opposite socket.
async fn splice(
    client: hyper::upgrade::Upgraded,
    upstream: hyper::upgrade::Upgraded,
    events: &GatewayEvents,
) {
    let mut client = TokioIo::new(client);
    let mut upstream = TokioIo::new(upstream);
    match tokio::io::copy_bidirectional(&mut upstream, &mut client).await {
        Ok((to_client, to_upstream)) => {
            events.log(
                LogLevel::Debug,
                format!("websocket tunnel closed ({to_client} bytes down, {to_upstream} bytes up)"),
            );
        }
        Err(err) => {
            events.log(
                LogLevel::Debug,
                format!("websocket tunnel ended with error: {err}"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::UPGRADE;
    use axum::http::Method;

    fn info_for(url: &str) -> RequestInfo {
        RequestInfo {
            is_gateway_intercept: true,
            is_gateway_host: false,
            is_websocket_request: true,
            target_id: Some("localhost:3030".into()),
            gateway_host: "example.com".into(),
            gateway_domain_postfix: "gateway-proxy.example.com".into(),
            target_method: Method::GET,
            backend_url: Some(Url::parse(url).unwrap()),
        }
    }

    #[test]
    fn test_upgrade_request_keeps_upgrade_headers() {
        let req = Request::builder()
            .uri("/backend/chat")
            .header(UPGRADE, "websocket")
            .header("sec-websocket-key", "abc123")
            .header(HOST, "gateway.example.org")
            .body(Body::empty())
            .unwrap();
        let info = info_for("ws://localhost:3030/chat?room=1");
        let url = info.backend_url.clone().unwrap();

        let upstream = build_upgrade_request(&info, &req, &url, "localhost:3030").unwrap();
        assert_eq!(upstream.uri().to_string(), "/chat?room=1");
        assert_eq!(upstream.headers().get(UPGRADE).unwrap(), "websocket");
        assert_eq!(upstream.headers().get("sec-websocket-key").unwrap(), "abc123");
        // Client host does not point at the backend, so it is preserved.
        assert_eq!(upstream.headers().get(HOST).unwrap(), "gateway.example.org");
    }

    #[test]
    fn test_upgrade_request_rewrites_backend_host() {
        let req = Request::builder()
            .uri("/chat")
            .header(HOST, "svc.localhost:3030")
            .body(Body::empty())
            .unwrap();
        let info = info_for("ws://localhost:3030/chat");
        let url = info.backend_url.clone().unwrap();

        let upstream = build_upgrade_request(&info, &req, &url, "localhost:3030").unwrap();
        assert_eq!(upstream.headers().get(HOST).unwrap(), "localhost:3030");
    }
}
