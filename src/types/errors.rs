/*!
 * Filesystem Service Error Types
 * Structured, type-safe error taxonomy shared by the service, providers and the wire
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Filesystem operation result
///
/// # Must Use
/// Filesystem operations can fail and must be handled to prevent data loss
#[must_use = "filesystem operations can fail and must be handled"]
pub type FsResult<T> = Result<T, FsError>;

/// Operation errors with a stable discriminant
///
/// Provider-level failures are normalized into this taxonomy where possible;
/// anything unknown is carried through `Other` with its original message and
/// operation context. Serialization uses the tagged enum pattern so the kind
/// survives the wire.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum FsError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File is a directory: {0}")]
    FileIsDirectory(String),

    #[error("File is not a directory: {0}")]
    FileNotADirectory(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File has changed on disk: {0}")]
    FileModifiedSince(String),

    #[error("File not modified since: {0}")]
    FileNotModifiedSince(String),

    #[error("Target exists and overwrite was not requested: {0}")]
    FileMoveConflict(String),

    #[error("Permission denied: {0}")]
    FilePermissionDenied(String),

    #[error("Resource is read-only: {0}")]
    FileReadOnly(String),

    #[error("Directory is not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("No provider registered for scheme: {0}")]
    NoProvider(String),

    #[error("A provider is already registered for scheme: {0}")]
    SchemeAlreadyRegistered(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl FsError {
    /// Wrap an unknown error with operation context, preserving the kind of
    /// errors that are already part of the taxonomy.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            FsError::Io(msg) => FsError::Io(format!("{context}: {msg}")),
            FsError::Other(msg) => FsError::Other(format!("{context}: {msg}")),
            other => other,
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => FsError::FileNotFound(err.to_string()),
            ErrorKind::AlreadyExists => FsError::FileExists(err.to_string()),
            ErrorKind::PermissionDenied => FsError::FilePermissionDenied(err.to_string()),
            _ => FsError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_roundtrip() {
        let error = FsError::FileNotFound("mem:/missing.txt".to_string());
        let json = serde_json::to_string(&error).unwrap();
        let deserialized: FsError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, deserialized);
    }

    #[test]
    fn test_error_context() {
        let error = FsError::Io("broken pipe".to_string()).with_context("copy mem:/a -> mem:/b");
        assert_eq!(
            error,
            FsError::Io("copy mem:/a -> mem:/b: broken pipe".to_string())
        );

        // Taxonomy kinds keep their discriminant untouched
        let error = FsError::FileNotFound("mem:/a".to_string()).with_context("read");
        assert_eq!(error, FsError::FileNotFound("mem:/a".to_string()));
    }

    #[test]
    fn test_io_error_normalization() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert!(matches!(FsError::from(io), FsError::FileNotFound(_)));
    }
}
