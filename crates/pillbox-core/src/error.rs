//! Error types for pillbox.

use thiserror::Error;

/// Result type alias using pillbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pillbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Drug record not found
    #[error("Drug not found: {0}")]
    DrugNotFound(uuid::Uuid),

    /// Uploaded image not found under any known extension
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upload exceeds the configured size limit
    #[error("File size {size} exceeds limit of {limit} bytes")]
    SizeLimitExceeded { size: usize, limit: usize },

    /// Vision API rejected the credentials or model id (HTTP 401)
    #[error("Vision API authentication failed: {0}")]
    Auth(String),

    /// Vision API endpoint or model id does not exist (HTTP 404)
    #[error("Vision API endpoint not found: {0}")]
    Endpoint(String),

    /// Vision API returned any other non-success status
    #[error("Vision API error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
