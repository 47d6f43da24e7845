//! # Logging Utilities
//!
//! Logging infrastructure for procgate using `tracing`.
//!
//! The service core only emits `tracing` events (rejected requests, chunk
//! progress, handle acquisition and release). This module decides where those
//! events end up:
//! - Pretty or JSON formatting
//! - Environment variable configuration
//! - Log level filtering
//! - Console (stderr) and optional file output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use procgate_utils::init_logging;
//!
//! // Initialize with default settings (reads from RUST_LOG env var)
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=procgate_core=trace`)
//! - `PROCGATE_LOG_FORMAT`: Set output format (`json` or `pretty`, default: `pretty`)
//! - `PROCGATE_LOG_FILE`: Optional path to a log file, or `default` for a dated file under
//!   `~/.procgate` (if not set, logs only to the console)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default for development)
    Pretty,
    /// JSON format (default for production)
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s}. Use 'pretty' or 'json'"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            ))),
        }
    }
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: Log level filter (e.g., `debug`, `procgate_core=debug`)
/// - `PROCGATE_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
/// - `PROCGATE_LOG_FILE`: Optional path to log file, or `default` for [`default_log_file`]
///
/// ## Errors
///
/// Returns an error if the log file directory cannot be created or a global
/// subscriber is already installed.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var("PROCGATE_LOG_FORMAT")
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty);

    let default_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<LogLevel>().ok())
        .map_or(Level::INFO, Into::into);

    init_logging_internal(format, default_level, log_file_from_env()?)
}

/// Initialize logging with explicit level and format
///
/// `PROCGATE_LOG_FILE` is still honoured for the optional file sink.
///
/// ## Errors
///
/// Same as [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_internal(format, level.into(), log_file_from_env()?)
}

/// Default location for a dated log file: `~/.procgate/YYYY-MM-DD-procgate.log`,
/// or under `/tmp` when no home directory is available.
///
/// ## Errors
///
/// Returns [`LoggingError::FileError`] if the `~/.procgate` directory cannot be created.
pub fn default_log_file() -> Result<PathBuf, LoggingError>
{
    let name = format!("{}-procgate.log", Utc::now().format("%Y-%m-%d"));
    let Ok(home) = env::var("HOME") else {
        return Ok(env::temp_dir().join(name));
    };
    let dir = PathBuf::from(home).join(".procgate");
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(name))
}

fn log_file_from_env() -> Result<Option<PathBuf>, LoggingError>
{
    match env::var("PROCGATE_LOG_FILE") {
        Ok(value) if value == "default" => default_log_file().map(Some),
        Ok(value) if !value.is_empty() => Ok(Some(PathBuf::from(value))),
        _ => Ok(None),
    }
}

fn file_writer(path: &Path) -> NonBlocking
{
    // The file name already carries the date, so no rotation.
    let appender = tracing_appender::rolling::never(
        path.parent().unwrap_or_else(|| Path::new(".")),
        path.file_name().unwrap_or_default(),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    // The subscriber is global and lives for the whole process.
    std::mem::forget(guard);
    non_blocking
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// One output: console or file, pretty or JSON, each with its own filter.
fn output_layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn init_logging_internal(format: LogFormat, default_level: Level, log_file: Option<PathBuf>)
    -> Result<(), LoggingError>
{
    // RUST_LOG can override the default level with more specific filters
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let mut outputs = vec![output_layer(format, io::stderr, true, filter())];
    if let Some(path) = log_file {
        outputs.push(output_layer(format, file_writer(&path), false, filter()));
    }

    Registry::default()
        .with(outputs)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
