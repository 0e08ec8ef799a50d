//! Streaming parser error types
//!
//! Errors raised while compiling subscriptions or tokenizing report text.

use thiserror::Error;

/// Errors that can occur in the streaming layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Malformed JSON in a chunk (fatal to the run)
    #[error("Parse error at byte {offset}: {message}")]
    Parse { offset: u64, message: String },

    /// Input ended before the top-level value was complete
    #[error("Unexpected end of input at byte {offset}")]
    UnexpectedEnd { offset: u64 },

    /// A subscription pattern could not be compiled
    #[error("Invalid pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// Events were fed after the parser was closed
    #[error("Parser already closed")]
    Closed,
}

impl StreamError {
    pub(crate) fn parse(offset: u64, message: impl Into<String>) -> Self {
        StreamError::Parse {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        StreamError::Pattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;
