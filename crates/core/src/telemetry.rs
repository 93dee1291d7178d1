//! Tracing subscriber initialisation
//!
//! [`init_tracing`] installs the subscriber once at process start and returns a
//! [`TelemetryGuard`]. Components log through `tracing` macros and spans; the
//! guard owns the log file (if any) and flushes it on [`TelemetryGuard::shutdown`].

use crate::config::{ConfigLoader, LogFormat, TelemetryConfig};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid telemetry configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to create log file {path}: {message}")]
    LogFile { path: PathBuf, message: String },

    #[error("Failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Handle to the installed subscriber
///
/// Keep it alive for the lifetime of the process and call
/// [`shutdown`](TelemetryGuard::shutdown) before exiting.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
    log_file: Option<(PathBuf, File)>,
}

impl TelemetryGuard {
    /// Path of the log file written by this process, if file logging is on
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_ref().map(|(path, _)| path.as_path())
    }

    /// Flush the log file to disk
    pub fn shutdown(self) {
        tracing::info!(service_name = %self.service_name, "Shutting down telemetry");

        if let Some((path, file)) = &self.log_file {
            if let Err(e) = file.sync_all() {
                eprintln!("Warning: failed to flush log file {}: {}", path.display(), e);
            }
        }
    }
}

/// Initialize the global tracing subscriber
///
/// Sets up an `EnvFilter` from `config.log_level`, a console layer (pretty or
/// JSON) and, when `config.log_dir` is set, a plain-text layer writing to
/// `log_<YYYY-MM-DD_HH-MM-SS>.log` in that directory.
///
/// # Errors
///
/// Returns error if:
/// - The configuration is invalid
/// - The log directory or file cannot be created
/// - A global subscriber is already installed
pub fn init_tracing(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    config
        .validate()
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?;

    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?;

    let mut layers: Vec<Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>> = Vec::new();

    match config.format {
        LogFormat::Pretty => layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .boxed(),
        ),
        LogFormat::Json => layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .boxed(),
        ),
    }

    let log_file = match &config.log_dir {
        Some(dir) => {
            let (path, file) = create_log_file(dir)?;
            let writer = file.try_clone().map_err(|e| TelemetryError::LogFile {
                path: path.clone(),
                message: e.to_string(),
            })?;
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(writer))
                    .boxed(),
            );
            Some((path, file))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        log_file = ?log_file.as_ref().map(|(path, _)| path),
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        service_name: config.service_name.clone(),
        log_file,
    })
}

fn create_log_file(dir: &Path) -> Result<(PathBuf, File), TelemetryError> {
    std::fs::create_dir_all(dir).map_err(|e| TelemetryError::LogFile {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let path = dir.join(format!("log_{}.log", timestamp));

    let file = File::create(&path).map_err(|e| TelemetryError::LogFile {
        path: path.clone(),
        message: e.to_string(),
    })?;

    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected_before_install() {
        let config = TelemetryConfig {
            log_level: "loud".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_log_file_is_timestamped() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _file) = create_log_file(&dir.path().join("logs")).unwrap();

        assert!(path.exists());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("log_"));
        assert!(name.ends_with(".log"));
    }
}
