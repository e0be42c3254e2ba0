//! Error types for capture, storage, catalog and upload operations.

use thiserror::Error;

/// Errors surfaced by a capture session.
///
/// Every variant leaves the session in a safe terminal state with all sources released.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Screen capture permission was denied: {0}")]
    PermissionDenied(String),
    #[error("No capture source is available: {0}")]
    NoSource(String),
    #[error("Screen recording is not supported in this environment: {0}")]
    UnsupportedEnvironment(String),
    #[error("Recording produced no data")]
    EmptyCapture,
    #[error("Recording failed: {0}")]
    EncoderFailure(String),
    #[error("Operation not allowed while {0}")]
    InvalidState(&'static str),
}

impl CaptureError {
    /// Returns true if starting a new session might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::EncoderFailure(_) | CaptureError::EmptyCapture | CaptureError::NoSource(_)
        )
    }
}

/// Errors from the chunked media store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File '{0}' not found")]
    NotFound(String),
    #[error("Range {start}-{end} not satisfiable for length {length}")]
    RangeNotSatisfiable { start: u64, end: u64, length: u64 },
    #[error("File '{file_id}' is corrupt: {reason}")]
    Corrupt { file_id: String, reason: String },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from the recording catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Recording {0} not found")]
    NotFound(i64),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<sqlx::Error> for CatalogError {
    fn from(error: sqlx::Error) -> Self {
        CatalogError::Storage(StoreError::Database(error))
    }
}

/// Errors from a request to the recordings API (uploads and the other client calls).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rejected by server ({status}): {message}")]
    Validation { status: u16, message: String },
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Validation failures will fail the same way again; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UploadError::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_not_retryable() {
        let err = UploadError::Validation {
            status: 400,
            message: "Only video files are allowed".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(UploadError::Network("timed out".to_string()).is_retryable());
        assert!(UploadError::Server {
            status: 500,
            message: "boom".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_permission_denied_is_not_retryable() {
        assert!(!CaptureError::PermissionDenied("denied".to_string()).is_retryable());
        assert!(CaptureError::EncoderFailure("codec crashed".to_string()).is_retryable());
    }
}
