//! Upstream transport engines.
//!
//! # Data Flow
//! ```text
//! classified request
//!     → http.rs       (streamed request/response proxying)
//!     → websocket.rs  (upgrade handshake, then raw byte splice)
//!     → tcp.rs        (raw socket bridge, separate mount point)
//! ```

pub mod http;
pub mod tcp;
pub mod websocket;

pub use http::{build_client, ProxyClient};
pub use tcp::TcpTunnel;
