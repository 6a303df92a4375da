//! Error types for the bucket store.

use std::path::PathBuf;

/// Errors that can occur while reading from or publishing to a bucket.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Object storage error, tagged with the key that was being accessed
    #[error("object storage error at '{key}': {source}")]
    ObjectStore {
        key: String,
        #[source]
        source: object_store::Error,
    },

    /// S3 request failure, with the SDK's full error context rendered
    #[error("S3 error at '{key}': {message}")]
    S3 { key: String, message: String },

    /// Object does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// Local IO error, tagged with the file being read
    #[error("IO error reading '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key could not be mapped onto the backend's path rules
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    /// Release metadata is unusable
    #[error("invalid release: {0}")]
    InvalidRelease(String),
}

impl StoreError {
    /// Wrap an `object_store` error, mapping its not-found variant.
    pub(crate) fn object_store(key: impl Into<String>, source: object_store::Error) -> Self {
        let key = key.into();
        match source {
            object_store::Error::NotFound { .. } => StoreError::NotFound(key),
            source => StoreError::ObjectStore { key, source },
        }
    }

    pub(crate) fn s3(key: impl Into<String>, source: impl std::error::Error) -> Self {
        StoreError::S3 {
            key: key.into(),
            message: aws_sdk_s3::error::DisplayErrorContext(source).to_string(),
        }
    }

    /// Returns true if this error only means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type alias for bucket store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
