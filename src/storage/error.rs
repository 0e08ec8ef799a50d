//! Storage error types
//!
//! Defines all errors that can occur in the persisted record store.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite rejected a statement or transaction
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, bad header, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Operation not supported by this kind of space
    #[error("Unsupported operation on space '{space}': {reason}")]
    Unsupported { space: String, reason: String },

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::Corruption("checksum mismatch".to_string());
        assert_eq!(err.to_string(), "Corrupt data: checksum mismatch");

        let err = StorageError::Unsupported {
            space: "tests".to_string(),
            reason: "payload spaces cannot be sorted".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported operation on space 'tests': payload spaces cannot be sorted"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let storage_err: StorageError = json_err.into();
        assert!(matches!(storage_err, StorageError::Serialization(_)));
    }
}
