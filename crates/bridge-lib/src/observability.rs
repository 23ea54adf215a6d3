//! Observability infrastructure for the bridge
//!
//! Provides:
//! - Tracing subscriber setup writing to stderr (stdout carries the protocol)
//! - Structured events for startup, commands, preload and shutdown

use crate::bridge::RunSummary;
use crate::error::BridgeError;
use crate::models::ModelStatus;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log line encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format '{}', expected json or text", other)),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Text => registry
            .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}

/// Structured logger for bridge events
///
/// Keeps event names and field sets consistent so log consumers can filter
/// on `event`.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log process startup
    pub fn log_startup(&self, version: &str, status: &ModelStatus) {
        info!(
            event = "bridge_started",
            service = %self.service,
            version = %version,
            input_dim = status.input_dim,
            hidden_layers = ?status.hidden_layers,
            dropout_rate = status.dropout_rate,
            model_state = ?status.model_state,
            "Model bridge started"
        );
    }

    /// Log the outcome of one command
    pub fn log_command(&self, action: &str, error: Option<&BridgeError>, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        match error {
            None => info!(
                event = "command_completed",
                service = %self.service,
                action = %action,
                elapsed_ms,
                "Command completed"
            ),
            Some(err) => warn!(
                event = "command_failed",
                service = %self.service,
                action = %action,
                error_kind = err.kind(),
                error = %err,
                elapsed_ms,
                "Command failed"
            ),
        }
    }

    /// Log a startup artifact load
    pub fn log_preload(&self, model_path: &Path, scaler_path: &Path, error: Option<&BridgeError>) {
        match error {
            None => info!(
                event = "model_preloaded",
                service = %self.service,
                model_path = %model_path.display(),
                scaler_path = %scaler_path.display(),
                "Model preloaded"
            ),
            Some(err) => warn!(
                event = "model_preload_failed",
                service = %self.service,
                model_path = %model_path.display(),
                scaler_path = %scaler_path.display(),
                error = %err,
                "Model preload failed, continuing without a model"
            ),
        }
    }

    /// Log process shutdown
    pub fn log_shutdown(&self, reason: &str, summary: &RunSummary) {
        info!(
            event = "bridge_shutdown",
            service = %self.service,
            reason = %reason,
            lines_read = summary.lines_read,
            commands_processed = summary.stats.commands_processed,
            errors = summary.stats.errors,
            predictions_served = summary.stats.predictions_served,
            "Model bridge shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }

    #[test]
    fn test_logger_without_subscriber_is_silent() {
        let logger = StructuredLogger::new("test");
        logger.log_command("predict", None, Duration::from_millis(3));
        logger.log_shutdown("end of input", &RunSummary::default());
    }
}
