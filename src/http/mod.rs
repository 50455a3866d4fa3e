//! HTTP hosting subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing layer)
//!     → gateway middleware (classify, filter, dispatch)
//!     → pass-through fallback when the gateway declines
//! ```

pub mod server;

pub use server::GatewayServer;
