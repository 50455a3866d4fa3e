//! Gateway error definitions and the resolution-failure status map.
//!
//! Upstream failures carry a short resolution/connection code (`NOTFOUND`,
//! `CONNREFUSED`, ...) alongside the mapped HTTP status, so subscribers and
//! clients can see both the wire-level cause and what was answered.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that can occur while handling a gateway request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed URL or host encountered during classification.
    #[error("classification failed: {0}")]
    Classification(String),

    /// Name resolution or connection establishment to the backend failed.
    #[error("upstream connect failed ({code}): {source}")]
    Connect {
        code: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Transport failure after the upstream connection was established.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Upstream answered a websocket handshake with something other than 101.
    #[error("upstream refused websocket upgrade with status {0}")]
    UpgradeDenied(StatusCode),

    /// A backend parser callback rejected or failed on the request.
    #[error("backend parser error: {0}")]
    Parser(String),
}

impl GatewayError {
    /// HTTP status answered to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Classification(_) | GatewayError::Parser(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Connect { code, .. } => status_for_code(Some(code)),
            GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpgradeDenied(status) => *status,
        }
    }

    /// The wire-level resolution/connection code, when one applies.
    pub fn original_code(&self) -> Option<&'static str> {
        match self {
            GatewayError::Connect { code, .. } => Some(code),
            _ => None,
        }
    }

    /// JSON body mirroring the mapped status and the original code, in the
    /// shape `{"code": 404, "statusCode": 404, "originalCode": "NOTFOUND"}`.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.status().as_u16(),
            "statusCode": self.status().as_u16(),
            "originalCode": self.original_code(),
            "message": self.to_string(),
        })
    }

    /// Fold a legacy-client error into a gateway error, recovering the
    /// underlying io error (and with it the resolution code) when present.
    pub fn from_client_error(err: hyper_util::client::legacy::Error) -> Self {
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                return GatewayError::Connect {
                    code: io_error_code(io),
                    source: std::io::Error::new(io.kind(), io.to_string()),
                };
            }
            source = cause.source();
        }
        GatewayError::Transport(err.to_string())
    }
}

/// Map a resolution/connection failure code to an HTTP status.
///
/// `NOTFOUND` → 404; `REFUSED`, `CANCELLED`, `CONNREFUSED` → 403; anything
/// else, including an absent code, → 500.
pub fn status_for_code(code: Option<&str>) -> StatusCode {
    match code {
        Some("NOTFOUND") => StatusCode::NOT_FOUND,
        Some("REFUSED") | Some("CANCELLED") | Some("CONNREFUSED") => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Classify an io error into the code vocabulary of [`status_for_code`].
pub fn io_error_code(err: &std::io::Error) -> &'static str {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => "NOTFOUND",
        ErrorKind::ConnectionRefused => "CONNREFUSED",
        ErrorKind::Interrupted => "CANCELLED",
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => "ECONNRESET",
        ErrorKind::TimedOut => "TIMEDOUT",
        _ => {
            // getaddrinfo failures surface as uncategorized io errors; their
            // message is the only stable signal.
            let msg = err.to_string();
            if msg.contains("lookup") || msg.contains("name resolution") {
                "NOTFOUND"
            } else {
                "UNKNOWN"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_map_totality() {
        assert_eq!(status_for_code(Some("NOTFOUND")), StatusCode::NOT_FOUND);
        for code in ["REFUSED", "CANCELLED", "CONNREFUSED"] {
            assert_eq!(status_for_code(Some(code)), StatusCode::FORBIDDEN);
        }
        for code in ["ECONNRESET", "TIMEDOUT", "UNKNOWN", "", "notfound"] {
            assert_eq!(
                status_for_code(Some(code)),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
        assert_eq!(status_for_code(None), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_io_error_classification() {
        use std::io::{Error, ErrorKind};
        assert_eq!(
            io_error_code(&Error::from(ErrorKind::ConnectionRefused)),
            "CONNREFUSED"
        );
        assert_eq!(io_error_code(&Error::from(ErrorKind::NotFound)), "NOTFOUND");
        assert_eq!(
            io_error_code(&Error::new(
                ErrorKind::Other,
                "failed to lookup address information: Name or service not known",
            )),
            "NOTFOUND"
        );
        assert_eq!(
            io_error_code(&Error::new(ErrorKind::Other, "something else")),
            "UNKNOWN"
        );
    }

    #[test]
    fn test_connect_error_body() {
        let err = GatewayError::Connect {
            code: "NOTFOUND",
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let body = err.body();
        assert_eq!(body["code"], 404);
        assert_eq!(body["statusCode"], 404);
        assert_eq!(body["originalCode"], "NOTFOUND");
    }

    #[test]
    fn test_denied_upgrade_keeps_upstream_status() {
        let err = GatewayError::UpgradeDenied(StatusCode::FORBIDDEN);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.original_code(), None);
    }
}
