//! Control-plane error types

use thiserror::Error;

/// Errors returned by a cloud control plane
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{kind}/{name} rejected by provider: {message}")]
    Rejected {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Invalid attributes for {0}: expected a JSON object")]
    InvalidAttributes(String),

    #[error("Control plane state version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
