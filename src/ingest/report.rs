//! Scan report projection
//!
//! Maps the matched parts of a scan report onto dictionaries and record
//! collections. Tests and happy paths are nested inside their operation and
//! close before it, so they hold the operation's [`MutableId`] and are tied
//! to a path and method only once the operation object itself closes.
//!
//! ```text
//! $.operations.listPets.conformanceRequestsResults[0]  → test #0 → op slot 0
//! $.operations.listPets.conformanceRequestsResults[1]  → test #1 → op slot 0
//! $.operations.listPets (shallow, closes last)         → link slot 0 → {path, method}
//! ```

use crate::index::{
    ArrivalDictionary, Collection, DictionarySet, Flatten, MutableId, SortedDictionary,
};
use crate::ingest::error::{IngestError, IngestResult};
use crate::storage::Space;
use crate::stream::{MatchHandler, MatchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Handler tags of the report subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportField {
    ScanVersion,
    Summary,
    Operation,
    HappyPath,
    Test,
}

/// Subscription table consumed by the ingestion driver
pub const REPORT_SUBSCRIPTIONS: [(&str, ReportField); 5] = [
    ("$.scanVersion.value()", ReportField::ScanVersion),
    ("$.summary.deep()", ReportField::Summary),
    ("$.operations.*.shallow()", ReportField::Operation),
    ("$.operations.*.scenarios.*.deep()", ReportField::HappyPath),
    (
        "$.operations.*.conformanceRequestsResults.*.deep()",
        ReportField::Test,
    ),
];

/// Sortable dictionary buckets
pub const SORTED_SPACES: [Space; 2] = [Space::Paths, Space::OperationIds];

/// Arrival-order dictionary buckets
pub const ARRIVAL_SPACES: [Space; 2] = [Space::Methods, Space::TestKeys];

/// Path and method an operation declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationLink {
    pub path: MutableId,
    pub method: u32,
}

/// Buffered operation, flushed once its dictionary ids are final
#[derive(Debug, Clone)]
pub struct OperationEntry {
    pub operation: MutableId,
    pub value: Value,
}

/// Buffered test index entry
#[derive(Debug, Clone, Copy)]
pub struct TestEntry {
    pub operation: MutableId,
    pub test_key: Option<u32>,
    pub criticality: u64,
}

/// Buffered happy path index entry
#[derive(Debug, Clone, Copy)]
pub struct HappyPathEntry {
    pub operation: MutableId,
}

/// Flat operation index row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRow {
    pub operation_id: u32,
    pub path: u32,
    pub method: u32,
}

/// Flat test index row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRow {
    pub operation_id: u32,
    pub path: u32,
    pub method: u32,
    pub test_key: Option<u32>,
    pub criticality: u64,
}

/// Flat happy path index row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HappyPathRow {
    pub operation_id: u32,
    pub path: u32,
    pub method: u32,
}

/// Record counts of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCounts {
    pub operations: u64,
    pub tests: u64,
    pub happy_paths: u64,
}

/// Report-level metadata persisted at finalize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub scan_version: Option<Value>,
    pub summary: Option<Value>,
    pub counts: ReportCounts,
    pub run_id: String,
    pub ingested_at: DateTime<Utc>,
}

impl ReportMeta {
    /// Metadata key the record is stored under
    pub const KEY: &'static str = "report";
}

/// Resolves operation references once the dictionaries are sorted
pub struct Resolver<'a> {
    sorted: &'a DictionarySet<Space, SortedDictionary>,
    links: &'a HashMap<MutableId, OperationLink>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        sorted: &'a DictionarySet<Space, SortedDictionary>,
        links: &'a HashMap<MutableId, OperationLink>,
    ) -> Self {
        Self { sorted, links }
    }

    fn sorted_id(&self, space: Space, handle: MutableId) -> IngestResult<u32> {
        self.sorted
            .id(space, handle)
            .ok_or_else(|| IngestError::InvalidReport(format!("unknown '{}' handle", space)))
    }

    /// Final ids of an operation and of its path and method
    pub fn operation(&self, operation: MutableId) -> IngestResult<OperationRow> {
        let link = self.links.get(&operation).ok_or_else(|| {
            let name = self
                .sorted
                .get_bucket(Space::OperationIds)
                .and_then(|d| d.value(operation))
                .unwrap_or("<unknown>");
            IngestError::UnresolvedOperation(name.to_string())
        })?;

        Ok(OperationRow {
            operation_id: self.sorted_id(Space::OperationIds, operation)?,
            path: self.sorted_id(Space::Paths, link.path)?,
            method: link.method,
        })
    }
}

impl<'a> Flatten<Resolver<'a>> for OperationEntry {
    type Flat = OperationRow;
    type Error = IngestError;

    fn flatten(&self, resolver: &Resolver<'a>) -> IngestResult<OperationRow> {
        resolver.operation(self.operation)
    }
}

impl<'a> Flatten<Resolver<'a>> for TestEntry {
    type Flat = TestRow;
    type Error = IngestError;

    fn flatten(&self, resolver: &Resolver<'a>) -> IngestResult<TestRow> {
        let op = resolver.operation(self.operation)?;
        Ok(TestRow {
            operation_id: op.operation_id,
            path: op.path,
            method: op.method,
            test_key: self.test_key,
            criticality: self.criticality,
        })
    }
}

impl<'a> Flatten<Resolver<'a>> for HappyPathEntry {
    type Flat = HappyPathRow;
    type Error = IngestError;

    fn flatten(&self, resolver: &Resolver<'a>) -> IngestResult<HappyPathRow> {
        let op = resolver.operation(self.operation)?;
        Ok(HappyPathRow {
            operation_id: op.operation_id,
            path: op.path,
            method: op.method,
        })
    }
}

/// In-memory state of one run, fed by the matcher
///
/// Payload collections (`tests`, `happy_paths`) are trimmed after every
/// flush; their index collections grow in lockstep and stay until finalize,
/// so a payload and its index entry always share an id.
pub struct ReportBuilder {
    pub scan_version: Option<Value>,
    pub summary: Option<Value>,
    pub sorted: DictionarySet<Space, SortedDictionary>,
    pub arrival: DictionarySet<Space, ArrivalDictionary>,
    pub links: HashMap<MutableId, OperationLink>,
    pub operations: Collection<OperationEntry>,
    pub tests: Collection<Value>,
    pub test_index: Collection<TestEntry>,
    pub happy_paths: Collection<Value>,
    pub happy_path_index: Collection<HappyPathEntry>,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self {
            scan_version: None,
            summary: None,
            sorted: DictionarySet::with_buckets(&SORTED_SPACES),
            arrival: DictionarySet::with_buckets(&ARRIVAL_SPACES),
            links: HashMap::new(),
            operations: Collection::new(),
            tests: Collection::new(),
            test_index: Collection::new(),
            happy_paths: Collection::new(),
            happy_path_index: Collection::new(),
        }
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> ReportCounts {
        ReportCounts {
            operations: self.operations.next_id(),
            tests: self.tests.next_id(),
            happy_paths: self.happy_paths.next_id(),
        }
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.sorted, &self.links)
    }

    /// Operation handle from the first wildcard capture
    fn operation_handle(&mut self, matched: &MatchResult<ReportField>) -> IngestResult<MutableId> {
        let key = matched
            .captures
            .first()
            .and_then(|c| c.as_key())
            .ok_or_else(|| {
                IngestError::InvalidReport("operations must be an object keyed by operation".to_string())
            })?;
        Ok(self.sorted.put(Space::OperationIds, key))
    }

    fn add_operation(&mut self, operation: MutableId, value: Value) {
        let path = value.get("path").and_then(Value::as_str);
        let method = value.get("method").and_then(Value::as_str);

        match (path, method) {
            (Some(path), Some(method)) => {
                let link = OperationLink {
                    path: self.sorted.put(Space::Paths, path),
                    method: self.arrival.put(Space::Methods, &method.to_ascii_lowercase()),
                };
                self.links.insert(operation, link);
            }
            _ => {
                tracing::warn!(
                    operation = operation.slot(),
                    "Operation object has no path or method"
                );
            }
        }

        self.operations.put(OperationEntry { operation, value });
    }

    fn add_test(&mut self, operation: MutableId, value: Value) {
        let test_key = value
            .pointer("/test/key")
            .and_then(Value::as_str)
            .map(|key| self.arrival.put(Space::TestKeys, key));
        let criticality = value
            .pointer("/outcome/criticality")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let id = self.tests.put(value);
        let index_id = self.test_index.put(TestEntry {
            operation,
            test_key,
            criticality,
        });
        debug_assert_eq!(id, index_id);
    }

    fn add_happy_path(&mut self, operation: MutableId, value: Value) {
        let id = self.happy_paths.put(value);
        let index_id = self.happy_path_index.put(HappyPathEntry { operation });
        debug_assert_eq!(id, index_id);
    }
}

impl MatchHandler<ReportField> for ReportBuilder {
    type Error = IngestError;

    fn on_match(&mut self, matched: &MatchResult<ReportField>, value: Value) -> IngestResult<()> {
        match matched.handler {
            ReportField::ScanVersion => self.scan_version = Some(value),
            ReportField::Summary => self.summary = Some(value),
            ReportField::Operation => {
                let op = self.operation_handle(matched)?;
                self.add_operation(op, value);
            }
            ReportField::Test => {
                let op = self.operation_handle(matched)?;
                self.add_test(op, value);
            }
            ReportField::HappyPath => {
                let op = self.operation_handle(matched)?;
                self.add_happy_path(op, value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StringIndex;
    use crate::stream::StreamParser;

    const REPORT: &str = r#"{
        "scanVersion": "2.0.0",
        "operations": {
            "updatePet": {
                "conformanceRequestsResults": [
                    {"test": {"key": "method-not-allowed"}, "outcome": {"criticality": 1}}
                ],
                "scenarios": [{"key": "happy.path"}],
                "operationId": "updatePet",
                "path": "/pets/{id}",
                "method": "PUT"
            },
            "addPet": {
                "operationId": "addPet",
                "path": "/pets",
                "method": "post",
                "conformanceRequestsResults": [
                    {"test": {"key": "body-missing"}, "outcome": {"criticality": 5}}
                ]
            }
        },
        "summary": {"state": "finished"}
    }"#;

    fn ingest(text: &str) -> ReportBuilder {
        let mut parser = StreamParser::from_patterns(REPORT_SUBSCRIPTIONS).unwrap();
        let mut builder = ReportBuilder::new();
        parser.feed(text.as_bytes(), &mut builder).unwrap();
        parser.end(&mut builder).unwrap();
        builder
    }

    #[test]
    fn test_projection_collects_everything() {
        let builder = ingest(REPORT);

        assert_eq!(builder.scan_version, Some(Value::from("2.0.0")));
        assert_eq!(builder.summary, Some(serde_json::json!({"state": "finished"})));
        assert_eq!(
            builder.counts(),
            ReportCounts {
                operations: 2,
                tests: 2,
                happy_paths: 1
            }
        );

        // Shallow operation payload keeps scalars only
        let op = &builder.operations.objects()[0].value.value;
        assert_eq!(op.get("method"), Some(&Value::from("PUT")));
        assert!(op.get("scenarios").is_none());

        let methods = builder.arrival.get_bucket(Space::Methods).unwrap();
        assert_eq!(methods.value(0), Some("put"));
    }

    #[test]
    fn test_forward_references_resolve_after_sort() {
        let mut builder = ingest(REPORT);
        builder.sorted.sort_all();

        let rows = builder.test_index.flatten(&builder.resolver()).unwrap();
        assert_eq!(rows.len(), 2);

        // "addPet" < "updatePet", "/pets" < "/pets/{id}"
        assert_eq!(rows[0].value.operation_id, 1);
        assert_eq!(rows[0].value.path, 1);
        assert_eq!(rows[0].value.criticality, 1);
        assert_eq!(rows[1].value.operation_id, 0);
        assert_eq!(rows[1].value.path, 0);
        assert_eq!(rows[1].value.method, 1);
        assert_eq!(rows[1].value.test_key, Some(1));
    }

    #[test]
    fn test_operation_without_path_is_unresolved() {
        let text = r#"{"operations": {"ghost": {
            "method": "get",
            "conformanceRequestsResults": [{"outcome": {"criticality": 3}}]
        }}}"#;
        let mut builder = ingest(text);
        builder.sorted.sort_all();

        let err = builder.test_index.flatten(&builder.resolver()).unwrap_err();
        assert!(matches!(err, IngestError::UnresolvedOperation(ref name) if name == "ghost"));
        assert_eq!(builder.sorted.get_bucket(Space::Paths).unwrap().len(), 0);
    }

    #[test]
    fn test_operations_array_is_rejected() {
        let mut parser = StreamParser::from_patterns(REPORT_SUBSCRIPTIONS).unwrap();
        let mut builder = ReportBuilder::new();
        let result = parser.feed(br#"{"operations": [{"path": "/a"}]}"#, &mut builder);
        assert!(matches!(result, Err(IngestError::InvalidReport(_))));
    }
}
