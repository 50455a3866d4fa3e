//! Configuration validation logic.

use crate::config::schema::AppConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate an AppConfig for semantic correctness.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. The subdomain separator must be a bare DNS label; anything else
    // breaks postfix matching and redirect synthesis.
    let subdomain = &config.gateway.gateway_subdomain;
    if subdomain.is_empty() {
        errors.push(ValidationError(
            "gateway.gateway_subdomain must not be empty".to_string(),
        ));
    } else if !is_dns_label(subdomain) {
        errors.push(ValidationError(format!(
            "gateway.gateway_subdomain '{}' is not a valid DNS label",
            subdomain
        )));
    }

    // 2. Forced protocols are limited to the schemes the engines speak.
    if let Some(protocol) = &config.gateway.force_protocol {
        if !matches!(protocol.as_str(), "http" | "https" | "ws" | "wss") {
            errors.push(ValidationError(format!(
                "gateway.force_protocol '{}' must be one of http, https, ws, wss",
                protocol
            )));
        }
    }

    // 3. Tunnel ports
    if config.gateway.socket_ports.contains(&0) {
        errors.push(ValidationError(
            "gateway.socket_ports must not contain 0".to_string(),
        ));
    }

    // 4. Bind address must parse
    if config.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError(format!(
            "server.bind_address '{}' is not a valid socket address",
            config.server.bind_address
        )));
    }

    if config.gateway.force_http && config.gateway.force_protocol.as_deref() == Some("https") {
        tracing::warn!("force_protocol = https is downgraded to http while force_http is set");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_dns_label(s: &str) -> bool {
    s.len() <= 63
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}
