//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener settings for the hosting HTTP server.
    pub server: ServerConfig,

    /// Gateway middleware behavior.
    pub gateway: GatewayConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Hosting server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Gateway middleware configuration. Immutable after construction and shared
/// read-only across requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Explicit authority of the gateway. When absent it is auto-derived from
    /// each request's `Host`, and subdomain-redirect mode stays disarmed.
    pub gateway_host: Option<String>,

    /// DNS label separating an encoded target from the gateway authority.
    pub gateway_subdomain: String,

    /// Mount prefix the default route parser strips from request paths.
    pub route_prefix: String,

    /// Overrides the parsed upstream scheme when set.
    pub force_protocol: Option<String>,

    /// Downgrade `https`/`wss` to `http`/`ws` before forwarding.
    pub force_http: bool,

    /// Reserved; influences websocket scheme selection in a future revision.
    pub force_websocket_protocol: bool,

    /// Backend ports eligible for raw TCP tunneling.
    pub socket_ports: Vec<u16>,

    /// Mirror emitted errors to the console sink.
    pub log_errors_to_console: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_host: None,
            gateway_subdomain: "gateway-proxy".to_string(),
            route_prefix: String::new(),
            force_protocol: None,
            force_http: true,
            force_websocket_protocol: true,
            socket_ports: Vec::new(),
            log_errors_to_console: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
