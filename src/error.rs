// src/error.rs

use serde_json::Error as SerdeError;
use std::io;
use thiserror::Error;

/// Custom error types for the application
#[derive(Error, Debug)]
pub enum AppError {
    /// Error for missing dependencies
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// The playlist could not be resolved, or resolved to zero items
    #[error("Metadata fetch error: {0}")]
    MetadataFetch(String),

    /// Error during download process
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Error for invalid input validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// I/O related errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Error for path operation failures
    #[error("Path error: {0}")]
    PathError(String),

    /// Error reading or writing the configuration file
    #[error("Config error: {0}")]
    ConfigError(String),

    /// A second run was started while one is still active
    #[error("A playlist download is already in progress")]
    RunInProgress,

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] SerdeError),

    /// General application errors
    #[error("Application error: {0}")]
    General(String),
}

/// Convert a string error to AppError::General
impl From<String> for AppError {
    fn from(error: String) -> Self {
        AppError::General(error)
    }
}

/// Convert a &str error to AppError::General
impl From<&str> for AppError {
    fn from(error: &str) -> Self {
        AppError::General(error.to_string())
    }
}
