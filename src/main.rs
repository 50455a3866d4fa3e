//! Gateway proxy entry point.

use std::path::Path;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway_proxy::config::loader::load_config;
use gateway_proxy::{AppConfig, BackendParser, Gateway, GatewayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_proxy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("gateway-proxy v0.1.0 starting");

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => AppConfig::default(),
    };

    tracing::info!(
        bind_address = %config.server.bind_address,
        gateway_subdomain = %config.gateway.gateway_subdomain,
        force_http = config.gateway.force_http,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    let gateway = Gateway::new(config.gateway.clone(), BackendParser::default());
    let server = GatewayServer::new(gateway);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
