//! Ingestion error types

use crate::storage::StorageError;
use crate::stream::StreamError;
use std::fmt;
use thiserror::Error;

/// Lifecycle of one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// Accepting chunks
    Streaming,
    /// Reconciling dictionaries and writing indices
    Finalizing,
    /// Store finalized, in-memory state released
    Done,
    /// A fatal error ended the run
    Failed,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestState::Streaming => write!(f, "streaming"),
            IngestState::Finalizing => write!(f, "finalizing"),
            IngestState::Done => write!(f, "done"),
            IngestState::Failed => write!(f, "failed"),
        }
    }
}

/// Errors that can occur while ingesting a report
#[derive(Error, Debug)]
pub enum IngestError {
    /// Malformed report text or bad subscription
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// The store rejected a write
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reading the report source failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A test or happy path references an operation that never supplied
    /// its path and method
    #[error("Operation '{0}' has no path or method")]
    UnresolvedOperation(String),

    /// Report structure the driver cannot project
    #[error("Invalid report: {0}")]
    InvalidReport(String),

    /// Call not allowed in the current state
    #[error("Cannot {action} while {state}")]
    InvalidState {
        state: IngestState,
        action: &'static str,
    },

    /// Bad ingestion options
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for ingestion
pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::InvalidState {
            state: IngestState::Done,
            action: "feed",
        };
        assert_eq!(err.to_string(), "Cannot feed while done");

        let err = IngestError::UnresolvedOperation("listPets".to_string());
        assert_eq!(err.to_string(), "Operation 'listPets' has no path or method");
    }

    #[test]
    fn test_stream_error_conversion() {
        let err: IngestError = StreamError::Closed.into();
        assert!(matches!(err, IngestError::Stream(StreamError::Closed)));
    }
}
