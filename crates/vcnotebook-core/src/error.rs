//! Error types for vcnotebook-core

use thiserror::Error;

/// Result type alias using vcnotebook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vcnotebook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input, rejected before any network call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File exceeds the upload ceiling
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Required configuration is absent or unusable
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Operation needs the hosted backend but the session is offline
    #[error("Hosted backend is unavailable in offline mode")]
    Offline,

    /// Network failure reaching a remote service
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote service rejected the credentials (401/403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Remote service returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Blocking task panicked or its lock was poisoned
    #[error("Background task failed: {0}")]
    Task(String),
}

impl Error {
    /// Whether this error means the hosted backend is unreachable or refuses
    /// our credentials. Such errors move a session to offline mode.
    pub const fn is_transport_or_credential(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unauthorized(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Task(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::Api {
                status: error.status().map_or(0, |status| status.as_u16()),
                message: format!("Failed to decode response: {error}"),
            };
        }
        if let Some(status) = error.status() {
            return Self::Api {
                status: status.as_u16(),
                message: error.to_string(),
            };
        }
        Self::Transport(error.to_string())
    }
}
