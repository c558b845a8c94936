//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level:
//!
//!   RUST_LOG=template_service=debug template-service
//!
//! With `COMMON__STRUCT_LOG=true` every event is a JSON line, which is what
//! the access log is designed for. `COMMON__HUMAN_READABLE_LOGS=true` switches
//! to the compact formatter for local work.

use tracing_subscriber::EnvFilter;

use crate::config::CommonSettings;

/// Tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
    Full,
}

impl LogFormat {
    pub fn from_settings(common: &CommonSettings) -> Self {
        if common.human_readable_logs {
            Self::Compact
        } else if common.struct_log {
            Self::Json
        } else {
            Self::Full
        }
    }
}

/// Tracing initialization error
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TracingError(String);

/// Install the global subscriber.
pub fn init(common: &CommonSettings) -> Result<(), TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(common.log_level.as_directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(common.environment.is_debug());

    let result = match LogFormat::from_settings(common) {
        LogFormat::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.try_init(),
    };

    result.map_err(|e| TracingError(e.to_string()))
}
