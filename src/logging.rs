//! # Logging Module
//!
//! Structured logging setup built on `tracing`.
//!
//! Every stage of the pipeline logs with key/value fields (`request_id`,
//! `operation_id`, `status`). This module only installs the subscriber:
//! an `EnvFilter`, a JSON or pretty `fmt` layer, and optionally a
//! non-blocking writer from `tracing-appender`.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `BRRTG_LOG_LEVEL` | `info` | trace/debug/info/warn/error |
//! | `BRRTG_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `BRRTG_LOG_ASYNC` | `true` | buffer output through a background writer |
//! | `BRRTG_LOG_TARGET_FILTER` | unset | extra comma separated filter directives |
//! | `BRRTG_LOG_INCLUDE_LOCATION` | `false` | include file and line |
//!
//! `RUST_LOG`, when set, takes precedence over `BRRTG_LOG_LEVEL`.
//!
//! ## Usage
//!
//! ```no_run
//! use brrtguard::logging::{LogConfig, LoggingState};
//!
//! let state = LoggingState::new();
//! state.init_once(&LogConfig::from_env()).expect("logging");
//! // Later calls are no-ops
//! assert!(!state.init_once(&LogConfig::default_dev()).expect("logging"));
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::{Mutex, PoisonError};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Write through a non-blocking background worker
    pub async_logging: bool,
    /// Extra filter directives, comma separated
    pub target_filter: Option<String>,
    /// Include file:line (dev only)
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::default_prod()
    }
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    value.and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`LogConfig::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let prod = Self::default_prod();
        Self {
            log_level: lookup("BRRTG_LOG_LEVEL").unwrap_or(prod.log_level),
            format: lookup("BRRTG_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(prod.format),
            async_logging: parse_bool(lookup("BRRTG_LOG_ASYNC"), prod.async_logging),
            target_filter: lookup("BRRTG_LOG_TARGET_FILTER"),
            include_location: parse_bool(lookup("BRRTG_LOG_INCLUDE_LOCATION"), prod.include_location),
        }
    }

    /// Configuration for local development and tests
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            target_filter: None,
            include_location: true,
        }
    }

    pub fn default_prod() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            async_logging: true,
            target_filter: None,
            include_location: false,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// Build the filter: `RUST_LOG` if set, else the configured level, plus any
/// extra target directives. Invalid directives are skipped.
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level().as_str()));
    if let Some(targets) = &config.target_filter {
        for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                // No subscriber is installed yet
                Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
            }
        }
    }
    filter
}

#[derive(Debug)]
struct Installed {
    _guard: Option<WorkerGuard>,
}

/// Owns the process-wide logging setup.
///
/// Only the first [`LoggingState::init_once`] installs a subscriber. The
/// non-blocking writer guard lives here so buffered logs are flushed when the
/// state is dropped.
#[derive(Debug, Default)]
pub struct LoggingState {
    installed: Mutex<Option<Installed>>,
}

impl LoggingState {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Install the global subscriber once.
    ///
    /// Returns `Ok(true)` when this call installed it and `Ok(false)` when it
    /// was already installed through this state.
    ///
    /// # Errors
    ///
    /// Fails when another global subscriber was installed elsewhere.
    pub fn init_once(&self, config: &LogConfig) -> Result<bool> {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if installed.is_some() {
            return Ok(false);
        }

        let (writer, guard) = if config.async_logging {
            let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
            (BoxMakeWriter::new(non_blocking), Some(guard))
        } else {
            (BoxMakeWriter::new(std::io::stdout), None)
        };

        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(writer)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(writer)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(build_filter(config))
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize logging")?;

        *installed = Some(Installed { _guard: guard });
        tracing::info!(
            level = %config.log_level,
            format = ?config.format,
            async_logging = config.async_logging,
            "Logging initialized"
        );
        Ok(true)
    }
}
