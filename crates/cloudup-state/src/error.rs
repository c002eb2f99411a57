//! State store error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or persisting CA and secret material
#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state store version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid id {0:?}: ids must be non-empty, without a leading '.' or path separators")]
    InvalidId(String),

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    #[error("corrupt secret {id}: {message}")]
    CorruptSecret { id: String, message: String },

    #[error("PKI error: {0}")]
    Pki(String),

    #[error("state store lock poisoned")]
    LockPoisoned,
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

impl From<rcgen::Error> for StateError {
    fn from(e: rcgen::Error) -> Self {
        Self::Pki(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StateError>;
