//! Query error types
//!
//! Defines all error conditions that can occur while listing or looking up
//! ingested records.

use crate::storage::{Space, StoreState};
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// The store has no complete run to read from
    #[error("Store is not finalized (state: {0})")]
    NotFinalized(StoreState),

    /// Page size or number out of range
    #[error("Invalid page: {0}")]
    InvalidPage(String),

    /// Unknown sort field for this record kind
    #[error("Invalid sort: {0}")]
    InvalidSort(String),

    /// Unknown filter field or malformed filter expression
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Requested record does not exist
    #[error("Record {id} not found in '{space}'")]
    NotFound { space: Space, id: u64 },

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Storage(err.into())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
