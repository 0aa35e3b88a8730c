//! Tracing setup for xdcmesh
//!
//! Provides dual output: console logs at a user-chosen level and a full trace
//! log of the last run on disk, so every delivery decision of a simulation
//! can be inspected afterwards.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the debug log written into the logs directory.
pub const LAST_RUN_LOG: &str = "xdcmesh-last-run.log";

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TracingSetupError {
    #[error("Failed to prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Initialize tracing with dual output: console (user level) + file (full trace)
///
/// # Arguments
/// * `console_level` - Log level for console output, overridden by `RUST_LOG`
/// * `logs_dir` - Directory to write the trace log to (defaults to "./logs")
///
/// Returns the path of the trace log, which is overwritten on every run.
///
/// # Errors
///
/// - `TracingSetupError::LogFile` - If the directory or file cannot be created
/// - `TracingSetupError::AlreadyInitialized` - If a subscriber is already set
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, TracingSetupError> {
    let log_file_path = prepare_log_path(logs_dir.unwrap_or_else(|| Path::new("logs")))?;
    let log_file = File::create(&log_file_path).map_err(|source| TracingSetupError::LogFile {
        path: log_file_path.clone(),
        source,
    })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Tracing initialized: console={}, trace_file={}",
        console_level,
        log_file_path.display()
    );

    Ok(log_file_path)
}

fn prepare_log_path(logs_dir: &Path) -> Result<PathBuf, TracingSetupError> {
    create_dir_all(logs_dir).map_err(|source| TracingSetupError::LogFile {
        path: logs_dir.to_path_buf(),
        source,
    })?;
    Ok(logs_dir.join(LAST_RUN_LOG))
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including every delivery decision
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use xdcmesh_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_log_path_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("logs");

        let path = prepare_log_path(&nested).unwrap();

        assert!(nested.is_dir());
        assert_eq!(path, nested.join(LAST_RUN_LOG));
    }

    #[test]
    fn test_prepare_log_path_fails_on_file() {
        let file = tempfile::NamedTempFile::new().unwrap();

        assert!(matches!(
            prepare_log_path(file.path()),
            Err(TracingSetupError::LogFile { .. })
        ));
    }

    #[test]
    fn test_cli_log_level_display_matches_tracing() {
        for level in [
            CliLogLevel::Error,
            CliLogLevel::Warn,
            CliLogLevel::Info,
            CliLogLevel::Debug,
            CliLogLevel::Trace,
        ] {
            assert_eq!(
                level.to_string(),
                level.as_tracing_level().to_string().to_lowercase()
            );
        }
    }
}
