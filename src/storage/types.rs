//! Core data types for the record store
//!
//! - `Space`: the named record and index spaces a report is split into
//! - `StoredRecord`: one `{id, value}` row as handed to or read from a store
//! - `SortOrder` and `StoreState`: ordering and lifecycle flags

use crate::index::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// How a space is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// Opaque payloads, compressed, fetched by id only
    Payload,
    /// JSON rows whose fields can be sorted and filtered on
    Indexed,
}

/// Named record space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Space {
    /// Conformance test payloads
    Tests,
    /// Happy path scenario payloads
    HappyPaths,
    /// Operation payloads (scalars of the operation object)
    Operations,
    /// Flattened test index rows
    TestsIndex,
    /// Flattened happy path index rows
    HappyPathsIndex,
    /// Flattened operation index rows
    OperationsIndex,
    /// Path dictionary entries
    Paths,
    /// Operation id dictionary entries
    OperationIds,
    /// HTTP method dictionary entries
    Methods,
    /// Test key dictionary entries
    TestKeys,
}

impl Space {
    pub fn all() -> &'static [Space] {
        &[
            Space::Tests,
            Space::HappyPaths,
            Space::Operations,
            Space::TestsIndex,
            Space::HappyPathsIndex,
            Space::OperationsIndex,
            Space::Paths,
            Space::OperationIds,
            Space::Methods,
            Space::TestKeys,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Space::Tests => "tests",
            Space::HappyPaths => "happyPaths",
            Space::Operations => "operations",
            Space::TestsIndex => "testsIndex",
            Space::HappyPathsIndex => "happyPathsIndex",
            Space::OperationsIndex => "operationsIndex",
            Space::Paths => "paths",
            Space::OperationIds => "operationIds",
            Space::Methods => "methods",
            Space::TestKeys => "testKeys",
        }
    }

    pub fn kind(self) -> SpaceKind {
        match self {
            Space::Tests | Space::HappyPaths | Space::Operations => SpaceKind::Payload,
            _ => SpaceKind::Indexed,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One persisted row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub value: Value,
}

impl StoredRecord {
    pub fn new(id: RecordId, value: Value) -> Self {
        Self { id, value }
    }

    /// Build a row from any serializable payload
    pub fn from_serialize<T: Serialize>(id: RecordId, value: &T) -> serde_json::Result<Self> {
        Ok(Self {
            id,
            value: serde_json::to_value(value)?,
        })
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

/// Lifecycle of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    /// Nothing ingested yet
    Empty,
    /// A run is writing (or died while writing)
    Ingesting,
    /// All spaces are consistent and queryable
    Finalized,
}

impl StoreState {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreState::Empty => "empty",
            StoreState::Ingesting => "ingesting",
            StoreState::Finalized => "finalized",
        }
    }
}

impl FromStr for StoreState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty" => Ok(StoreState::Empty),
            "ingesting" => Ok(StoreState::Ingesting),
            "finalized" => Ok(StoreState::Finalized),
            other => Err(format!("unknown store state '{}'", other)),
        }
    }
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
