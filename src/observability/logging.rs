//! Structured logging configuration.

use crate::config::{LogFormat, LoggingSettings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_FILTER_ENV: &str = "CONTACT_DEDUP_LOG";

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter applied to all layers.
    pub filter: EnvFilter,
    /// Optional log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Resolves the filter directive.
    ///
    /// Precedence: `CONTACT_DEDUP_LOG`, then `RUST_LOG`, then the configured
    /// level, then `debug` with `--verbose` or `info` otherwise.
    #[must_use]
    pub fn directive(settings: &LoggingSettings, verbose: bool) -> String {
        std::env::var(LOG_FILTER_ENV)
            .ok()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .filter(|v| !v.trim().is_empty())
            .or_else(|| settings.level.clone())
            .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string())
    }

    /// Builds the configuration from settings.
    ///
    /// An unparsable directive falls back to `info` with a note on stderr.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        let directive = Self::directive(settings, verbose);
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid log filter '{directive}': {e}");
            EnvFilter::new("info")
        });
        Self {
            format: settings.format,
            filter,
            file: settings.file.clone(),
        }
    }
}
