//! Gateway event channels.
//!
//! The core emits structured events instead of writing to a sink directly:
//! an `error` channel for every internal failure and a `log` channel for
//! leveled diagnostics. Both are broadcast channels so any number of
//! subscribers can attach; emission never blocks and events with no
//! subscriber are dropped. Errors are optionally mirrored to the console
//! through `tracing`.

use tokio::sync::broadcast;

use crate::error::GatewayError;

/// Severity of a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A leveled diagnostic event.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

/// Snapshot of a gateway error, cloneable for fan-out.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub message: String,
    pub status: u16,
    pub original_code: Option<&'static str>,
}

impl From<&GatewayError> for ErrorEvent {
    fn from(err: &GatewayError) -> Self {
        Self {
            message: err.to_string(),
            status: err.status().as_u16(),
            original_code: err.original_code(),
        }
    }
}

/// Emitter shared by every request the gateway handles.
#[derive(Debug)]
pub struct GatewayEvents {
    errors: broadcast::Sender<ErrorEvent>,
    logs: broadcast::Sender<LogEvent>,
    log_errors_to_console: bool,
}

impl GatewayEvents {
    pub fn new(log_errors_to_console: bool) -> Self {
        let (errors, _) = broadcast::channel(64);
        let (logs, _) = broadcast::channel(64);
        Self {
            errors,
            logs,
            log_errors_to_console,
        }
    }

    /// Subscribe to internal errors.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.errors.subscribe()
    }

    /// Subscribe to leveled log events.
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEvent> {
        self.logs.subscribe()
    }

    /// Emit an error event, mirroring it to the console sink when configured.
    pub fn error(&self, err: &GatewayError) {
        let event = ErrorEvent::from(err);
        if self.log_errors_to_console {
            tracing::error!(
                status = event.status,
                original_code = ?event.original_code,
                "{}",
                event.message
            );
        }
        let _ = self.errors.send(event);
    }

    /// Emit a leveled log event.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        let _ = self.logs.send(LogEvent { level, message });
    }
}
