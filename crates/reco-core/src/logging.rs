//! Structured logging for reco
//!
//! `tracing` with a pretty or JSON-lines formatter on stderr, plus an optional
//! log file. Initialize once at startup:
//!
//! ```ignore
//! use reco_core::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default())?;
//! ```
//!
//! # Correlation Fields
//!
//! Use these field names consistently in events:
//! - `pid`: process id embedded in a name
//! - `buffer`: buffer id or display name
//! - `artifact`: path inside the backup directory
//! - `path`: user file path
//! - `kind`: artifact kind
//!
//! Buffer contents are never logged.

pub use crate::config::LogFormat;
use serde::{Deserialize, Serialize};
use std::io;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGING_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error)
    /// Can be overridden by RUST_LOG environment variable
    pub level: String,

    /// Output format (pretty or json)
    pub format: LogFormat,

    /// Optional path to log file
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,

    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("failed to create log file: {0}")]
    FileCreate(#[from] io::Error),

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

fn open_log_file(path: &Path) -> io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    let existed = path.exists();
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    #[cfg(unix)]
    if !existed {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

/// Initialize the global logging subscriber
///
/// Subsequent calls return `Err(LogError::AlreadyInitialized)`.
/// `RUST_LOG` overrides the configured level, e.g. `RUST_LOG=reco_core=debug`.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Err(LogError::AlreadyInitialized);
    }
    config
        .level
        .parse::<LogLevel>()
        .map_err(|_| LogError::InvalidLevel(config.level.clone()))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_writer = config.file.as_deref().map(open_log_file).transpose()?;

    match config.format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(true),
            );

            if let Some(file) = file_writer {
                let file_layer = fmt::layer()
                    .with_writer(file)
                    .with_target(true)
                    .with_ansi(false);
                tracing::subscriber::set_global_default(subscriber.with(file_layer))?;
            } else {
                tracing::subscriber::set_global_default(subscriber)?;
            }
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_timer(SystemTime)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .flatten_event(true),
            );

            if let Some(file) = file_writer {
                let file_layer = fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_timer(SystemTime)
                    .with_target(true)
                    .flatten_event(true);
                tracing::subscriber::set_global_default(subscriber.with(file_layer))?;
            } else {
                tracing::subscriber::set_global_default(subscriber)?;
            }
        }
    }

    let _ = LOGGING_INITIALIZED.set(true);

    tracing::debug!(
        log_level = %config.level,
        log_format = %config.format,
        log_file = ?config.file,
        "Logging initialized"
    );

    Ok(())
}

/// Log levels that can be used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!(
                "unknown log level: {s}. Expected one of: trace, debug, info, warn, error"
            )),
        }
    }
}
