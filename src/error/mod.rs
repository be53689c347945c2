//! Error types for registry listing, planning and image operations

pub mod handlers;

use crate::sync::plan::OperationKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Bad or missing credentials, or the auth endpoint could not be reached
    #[error("Authentication error: {0}")]
    Auth(String),
    /// A registry call kept failing after the retry budget was spent
    #[error("Registry unavailable during {operation} after {attempts} attempts: {message}")]
    RegistryUnavailable {
        operation: String,
        attempts: u32,
        message: String,
    },
    /// A wildcard package produced no tags in the source registry
    #[error("Unknown package: {0} has no tags in the source registry")]
    UnknownPackage(String),
    /// A pull, retag, push or delete failed for one image
    #[error("{kind} failed for {image}: {message}")]
    Operation {
        kind: OperationKind,
        image: String,
        message: String,
    },
    /// Container runtime (docker CLI) errors
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid image reference '{0}'")]
    InvalidReference(String),
    /// Unexpected registry response that is not worth retrying
    #[error("Registry error: {0}")]
    Registry(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

impl From<glob::PatternError> for SyncError {
    fn from(err: glob::PatternError) -> Self {
        SyncError::Validation(format!("Invalid pattern: {}", err))
    }
}

impl From<std::string::FromUtf8Error> for SyncError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        SyncError::Parse(format!("UTF-8 conversion error: {}", err))
    }
}
