//! Raw TCP tunnel.
//!
//! A plain socket bridge to a configured backend port. Not part of the
//! default middleware flow; hosts that dispatch CONNECT-style traffic mount
//! [`TcpTunnel::serve`] on their own listener, gated by
//! `GatewayConfig::socket_ports`.

use std::sync::Arc;

use tokio::io::{copy_bidirectional, AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{io_error_code, GatewayError};
use crate::events::{GatewayEvents, LogLevel};

/// Bridge one client stream to `addr`, full duplex, until either side
/// closes. Half-close is allowed: EOF on one side shuts down the write half
/// of the other.
pub async fn bridge<S>(client: &mut S, addr: &str) -> Result<(u64, u64), GatewayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut upstream = TcpStream::connect(addr)
        .await
        .map_err(|e| GatewayError::Connect {
            code: io_error_code(&e),
            source: e,
        })?;
    upstream
        .set_nodelay(true)
        .map_err(|e| GatewayError::Connect {
            code: io_error_code(&e),
            source: e,
        })?;

    copy_bidirectional(client, &mut upstream)
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))
}

/// Accept-loop mount point bridging every connection to one backend.
pub struct TcpTunnel {
    addr: String,
    events: Arc<GatewayEvents>,
}

impl TcpTunnel {
    /// Build a tunnel toward `target`, refusing ports outside
    /// `socket_ports`.
    pub fn new(
        config: &GatewayConfig,
        target: &Url,
        events: Arc<GatewayEvents>,
    ) -> Result<Self, GatewayError> {
        let host = target.host_str().ok_or_else(|| {
            GatewayError::Classification(format!("tunnel target {target} has no host"))
        })?;
        let port = target.port_or_known_default().ok_or_else(|| {
            GatewayError::Classification(format!("tunnel target {target} has no port"))
        })?;
        if !config.socket_ports.contains(&port) {
            return Err(GatewayError::Classification(format!(
                "port {port} is not eligible for raw tunneling"
            )));
        }
        Ok(Self {
            addr: format!("{host}:{port}"),
            events,
        })
    }

    /// Accept connections forever, one bridge task per client.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        loop {
            let (mut stream, peer) = listener.accept().await.map_err(|e| GatewayError::Connect {
                code: io_error_code(&e),
                source: e,
            })?;
            let addr = self.addr.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                events.log(
                    LogLevel::Debug,
                    format!("tcp tunnel opened from {peer} to {addr}"),
                );
                match bridge(&mut stream, &addr).await {
                    Ok((up, down)) => events.log(
                        LogLevel::Debug,
                        format!("tcp tunnel to {addr} closed ({up} bytes up, {down} bytes down)"),
                    ),
                    Err(err) => events.error(&err),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_port_gating() {
        let events = Arc::new(GatewayEvents::new(false));
        let target = Url::parse("http://127.0.0.1:5432").unwrap();

        // Default config has no eligible ports.
        let config = GatewayConfig::default();
        assert!(TcpTunnel::new(&config, &target, events.clone()).is_err());

        let config = GatewayConfig {
            socket_ports: vec![5432],
            ..GatewayConfig::default()
        };
        assert!(TcpTunnel::new(&config, &target, events).is_ok());
    }

    #[tokio::test]
    async fn test_bridge_echoes_both_ways() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = backend.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let (mut client_side, mut gateway_side) = tokio::io::duplex(1024);
        let addr = backend_addr.to_string();
        let bridge_task = tokio::spawn(async move { bridge(&mut gateway_side, &addr).await });

        client_side.write_all(b"hello").await.unwrap();
        let mut echoed = [0u8; 5];
        client_side.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"hello");

        drop(client_side);
        let (up, down) = bridge_task.await.unwrap().unwrap();
        assert_eq!(up, 5);
        assert_eq!(down, 5);
    }

    #[tokio::test]
    async fn test_bridge_maps_refused_connection() {
        let (_a, mut b) = tokio::io::duplex(64);
        // Port 1 is essentially never listening.
        let err = bridge(&mut b, "127.0.0.1:1").await.unwrap_err();
        assert_eq!(err.original_code(), Some("CONNREFUSED"));
        assert_eq!(err.status().as_u16(), 403);
    }
}
