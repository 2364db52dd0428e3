//! Error types for fieldmap reconstruction
//!
//! Precondition failures (geometry, echo times, configuration) are reported
//! before any computation starts. Per-voxel numeric degeneracies are never
//! errors; they are masked out or follow the configured T2* policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldmapError {
    /// Missing, unreadable or invalid input image, or unwritable output
    #[error("I/O error: {0}")]
    Io(String),

    /// Volumes that must share a voxel grid do not
    #[error("Geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// Non-increasing, duplicate or otherwise unusable echo times
    #[error("Invalid echo times: {0}")]
    InvalidEchoTimes(String),

    /// Wrapped phase field that cannot be integrated in some region
    #[error("Phase unwrapping failed: {0}")]
    UnwrapFailure(String),

    /// Out-of-range configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FieldmapError>;

impl From<std::io::Error> for FieldmapError {
    fn from(e: std::io::Error) -> Self {
        FieldmapError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = FieldmapError::InvalidEchoTimes("TE1 <= TE0".to_string());
        assert_eq!(e.to_string(), "Invalid echo times: TE1 <= TE0");

        let e = FieldmapError::GeometryMismatch("phase vs magnitude".to_string());
        assert!(e.to_string().starts_with("Geometry mismatch"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: FieldmapError = io.into();
        match e {
            FieldmapError::Io(msg) => assert!(msg.contains("gone")),
            other => panic!("Expected Io variant, got {:?}", other),
        }
    }
}
