//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the gateway middleware wired in
//! - Mount the pass-through fallback the middleware delegates to
//! - Bind the server to a listener
//! - Graceful shutdown on Ctrl+C

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::gateway::Gateway;

/// HTTP server hosting the gateway middleware.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Wire the gateway middleware around the pass-through fallback.
    pub fn new(gateway: Gateway) -> Self {
        let router = gateway
            .attach(Router::new().fallback(pass_through))
            .layer(TraceLayer::new_for_http());
        Self { router }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Reached only when the gateway declined to intercept.
async fn pass_through() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "no gateway route matched")
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
