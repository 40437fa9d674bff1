//! Structured logging setup for binaries that embed managed threads.
//!
//! The library only emits `tracing` events; installing a subscriber is up
//! to the application. This module provides the subscriber used by the
//! `managed-thread` binary.
//!
//! ## Environment Variables
//!
//! - `MANAGED_THREAD_LOG` or `RUST_LOG`: filter directive (e.g. `managed_thread=debug`)
//! - `MANAGED_THREAD_LOG_FORMAT`: output format (`pretty`, `compact`, `json`)
//!
//! ## Examples
//!
//! ```bash
//! # Lifecycle transitions at debug level
//! MANAGED_THREAD_LOG=managed_thread=debug managed-thread timer --interval-ms 50
//!
//! # JSON lines, one event per transition
//! MANAGED_THREAD_LOG_FORMAT=json managed-thread fanout --delays 100,0,30
//! ```

use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

const DEFAULT_FILTER: &str = "managed_thread=info,warn";
const DEBUG_FILTER: &str = "managed_thread=debug,info";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// Single line per event
    Compact,
    /// JSON lines for log aggregation
    Json,
}

impl LogFormat {
    /// Parse from string (case-insensitive); unknown values fall back to pretty
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive (e.g., "debug", "managed_thread=debug,warn")
    pub filter: String,
    pub format: LogFormat,
    /// Emit an event when a managed thread's run span opens and closes
    pub with_spans: bool,
    /// Include file/line in events
    pub with_file: bool,
    /// Include OS thread names; managed threads can be named via options
    pub with_thread_names: bool,
    pub with_thread_ids: bool,
    /// Include target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            with_spans: false,
            with_file: false,
            with_thread_names: true,
            with_thread_ids: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let filter = std::env::var("MANAGED_THREAD_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());

        let format = std::env::var("MANAGED_THREAD_LOG_FORMAT")
            .map(|s| LogFormat::parse(&s))
            .unwrap_or_default();

        Self {
            filter,
            format,
            ..Default::default()
        }
    }

    /// Debug-level lifecycle events with source locations
    pub fn debug() -> Self {
        Self {
            filter: DEBUG_FILTER.to_string(),
            with_file: true,
            with_thread_ids: true,
            ..Default::default()
        }
    }

    /// JSON lines with span open/close events, for log aggregation
    pub fn production() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Json,
            with_spans: true,
            with_target: true,
            ..Default::default()
        }
    }

    /// Raise the filter to debug when `verbose` is set.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.filter = DEBUG_FILTER.to_string();
        }
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.with_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(self.span_events())
            .with_file(self.with_file)
            .with_line_number(self.with_file)
            .with_thread_names(self.with_thread_names)
            .with_thread_ids(self.with_thread_ids)
            .with_target(self.with_target);
        match self.format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns `false` if a subscriber was already installed; the existing one
/// is kept.
///
/// ```rust,ignore
/// use managed_thread::logging::{init, LogConfig};
///
/// init(LogConfig::from_env());
/// ```
pub fn init(config: LogConfig) -> bool {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::registry()
        .with(config.layer())
        .with(env_filter);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// Initialize logging from `MANAGED_THREAD_LOG*` variables.
pub fn init_from_env() -> bool {
    init(LogConfig::from_env())
}
