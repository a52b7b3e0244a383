//! Error types for the versioned store.

use entivc_types::VersionId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur against the versioned store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The branch does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// The version does not exist.
    #[error("version not found: {0}")]
    VersionNotFound(VersionId),

    /// The document does not exist inside the version.
    #[error("document not found: {path} in version {version_id}")]
    DocumentNotFound {
        /// Version the lookup ran against.
        version_id: VersionId,
        /// Document path inside the version tree.
        path: String,
    },

    /// Backend failure (network, storage).
    #[error("store backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A stored document could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Creates a retryable backend error.
    pub fn backend_retryable(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable backend error.
    pub fn backend_fatal(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the operation can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend { retryable: true, .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_flag() {
        assert!(StoreError::backend_retryable("connection reset").is_retryable());
        assert!(!StoreError::backend_fatal("repository deleted").is_retryable());
        assert!(!StoreError::BranchNotFound("main".into()).is_retryable());
    }
}
