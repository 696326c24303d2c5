//! Logging setup for applications built on this crate
//!
//! The crate itself only emits `tracing` events through [`crate::TracingSink`].
//! Applications that don't bring their own subscriber can install one here.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LoggingMode {
    /// No output
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose output with source locations
    Debug,
}

impl LoggingMode {
    /// Parse a `BILI_LOG_MODE` value. Unknown values yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "silent" => Some(LoggingMode::Silent),
            "development" | "dev" => Some(LoggingMode::Development),
            "debug" => Some(LoggingMode::Debug),
            _ => None,
        }
    }
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
}

/// Install a global subscriber for the given mode.
///
/// # Environment Variables
///
/// - `BILI_LOG_LEVEL`: filter directive, e.g. `bili_stream=debug`
/// - `RUST_LOG`: used when `BILI_LOG_LEVEL` is not set
///
/// ```rust,ignore
/// bili_stream::logging::init_logging(LoggingMode::Development)?;
/// ```
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `BILI_LOG_MODE` (silent, development, debug).
///
/// Defaults to silent when unset or unrecognized.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = std::env::var("BILI_LOG_MODE")
        .ok()
        .and_then(|name| LoggingMode::from_name(&name))
        .unwrap_or(LoggingMode::Silent);

    init_logging(mode)
}

/// Filter from `BILI_LOG_LEVEL`, then `RUST_LOG`, then `default_level`.
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var("BILI_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter(e.to_string()))
}

/// Whether a global subscriber has already been installed.
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

pub fn init_silent() -> Result<(), LoggingError> {
    init_logging(LoggingMode::Silent)
}
