//! Reverse HTTP/WebSocket gateway middleware.
//!
//! Classifies incoming requests, resolves the intended backend through a
//! pluggable parser, and forwards them as a streamed HTTP proxy, a raw
//! websocket tunnel, or (for CONNECT-style hosts) a raw TCP bridge. In
//! subdomain-redirect mode the target identity is encoded into a DNS label
//! so proxied services keep their own browser origin.

// Core subsystems
pub mod classify;
pub mod codec;
pub mod config;
pub mod gateway;
pub mod http;
pub mod parser;
pub mod tunnel;

// Cross-cutting concerns
pub mod error;
pub mod events;

pub use classify::RequestInfo;
pub use config::{AppConfig, GatewayConfig};
pub use error::GatewayError;
pub use events::{GatewayEvents, LogLevel};
pub use gateway::{FilterDecision, Gateway};
pub use http::GatewayServer;
pub use parser::{BackendParser, RequestContext, RouteResolver};
pub use tunnel::TcpTunnel;
