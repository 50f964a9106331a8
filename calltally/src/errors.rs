use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while driving the host application's accessibility tree.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Target screen not found: {0}")]
    ScreenNotFound(String),

    #[error("Login timed out: {0}")]
    LoginTimeout(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Query trigger failed: {0}")]
    QueryTriggerFailed(String),

    #[error("Export trigger failed: {0}")]
    ExportTriggerFailed(String),

    #[error("Control not found: {0}")]
    ControlNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Fatal startup conditions, checked before any UI interaction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("service-account key not found at {}", .0.display())]
    MissingKeyFile(PathBuf),
}

/// Crate-level error type consumed by the orchestration loop.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("checkpoint persistence failed: {0}")]
    Checkpoint(#[source] std::io::Error),

    #[error("sheet store error: {0}")]
    Sheet(String),

    #[error("report delivery error: {0}")]
    Report(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
