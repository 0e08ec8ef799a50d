//! Report query executor
//!
//! Answers paginated list and lookup requests against a finalized store.
//!
//! # Execution Pipeline
//!
//! ```text
//! state check → order index rows → filter → slice page → fetch payloads → label
//! ```
//!
//! Only the payloads of the requested page are read; sorting and filtering
//! never touch them.

use crate::index::{DictEntry, RecordId};
use crate::ingest::{HappyPathRow, OperationRow, ReportMeta, TestRow};
use crate::query::criteria::{dictionary_for, Filter, Page, RecordKind, SortSpec};
use crate::query::error::{QueryError, QueryResult};
use crate::storage::{RecordStore, SortOrder, Space, StoreState, StoredRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A conformance test with its labels resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestView {
    pub id: RecordId,
    pub operation_id: String,
    pub path: String,
    pub method: String,
    pub test_key: Option<String>,
    pub criticality: u64,
    pub payload: Value,
}

/// A happy path scenario with its labels resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HappyPathView {
    pub id: RecordId,
    pub operation_id: String,
    pub path: String,
    pub method: String,
    pub payload: Value,
}

/// An operation with its labels resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationView {
    pub id: RecordId,
    pub operation_id: String,
    pub path: String,
    pub method: String,
    pub payload: Value,
}

/// Optional list arguments
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub sort: Option<SortSpec>,
    /// Combined with AND
    pub filters: Vec<Filter>,
}

impl ListOptions {
    pub fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Dictionary id → label maps for one query
#[derive(Default)]
struct Labels {
    by_space: HashMap<Space, HashMap<u32, String>>,
}

impl Labels {
    fn label(&self, space: Space, id: u32) -> String {
        self.by_space
            .get(&space)
            .and_then(|m| m.get(&id))
            .cloned()
            .unwrap_or_else(|| format!("#{}", id))
    }

    fn id_of(&self, space: Space, label: &str) -> Option<u32> {
        self.by_space
            .get(&space)?
            .iter()
            .find(|(_, v)| v.as_str() == label)
            .map(|(&id, _)| id)
    }
}

/// Filter with dictionary labels replaced by ids
struct ResolvedFilter<'a> {
    filter: &'a Filter,
    target: Value,
}

/// Query front end over a [`RecordStore`]
pub struct ReportQuery {
    store: Arc<dyn RecordStore>,
}

impl ReportQuery {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn ensure_finalized(&self) -> QueryResult<()> {
        match self.store.state().await? {
            StoreState::Finalized => Ok(()),
            state => Err(QueryError::NotFinalized(state)),
        }
    }

    /// Entries of one dictionary, ordered by id
    async fn dictionary(&self, space: Space) -> QueryResult<Vec<DictEntry>> {
        self.store
            .order_by(space, None, SortOrder::Asc)
            .await?
            .into_iter()
            .map(|r| -> QueryResult<DictEntry> { Ok(serde_json::from_value(r.value)?) })
            .collect()
    }

    async fn labels(&self, spaces: &[Space]) -> QueryResult<Labels> {
        let mut labels = Labels::default();
        for &space in spaces {
            let map = self
                .dictionary(space)
                .await?
                .into_iter()
                .map(|e| (e.id, e.value))
                .collect();
            labels.by_space.insert(space, map);
        }
        Ok(labels)
    }

    /// Ordered, filtered index rows of one kind plus the total before paging
    async fn select(
        &self,
        kind: RecordKind,
        page: u64,
        size: u64,
        options: &ListOptions,
        labels: &Labels,
    ) -> QueryResult<(Vec<StoredRecord>, u64)> {
        if size == 0 {
            return Err(QueryError::InvalidPage("page size must be positive".to_string()));
        }
        if let Some(sort) = &options.sort {
            sort.validate(kind)?;
        }

        let mut resolved = Vec::with_capacity(options.filters.len());
        for filter in &options.filters {
            filter.validate(kind)?;

            let target = match dictionary_for(&filter.field) {
                // Label fields match by label, whatever the text looks like
                Some(space) => match labels.id_of(space, &filter.value.as_label()) {
                    Some(id) => Value::from(id),
                    // Unknown label: equality can never hold
                    None => Value::Null,
                },
                None => filter.value.to_json(),
            };
            resolved.push(ResolvedFilter { filter, target });
        }

        let (field, order) = match &options.sort {
            Some(sort) => (Some(sort.field.as_str()), sort.order),
            None => (None, SortOrder::Asc),
        };
        let rows = self.store.order_by(kind.index_space(), field, order).await?;

        let matched: Vec<StoredRecord> = rows
            .into_iter()
            .filter(|row| {
                resolved.iter().all(|f| {
                    let value = row.value.get(&f.filter.field).unwrap_or(&Value::Null);
                    f.filter.op.compare(value, &f.target)
                })
            })
            .collect();

        let total = matched.len() as u64;
        let (start, end) = Page::<()>::bounds(page, size, total);
        let page_rows = matched.into_iter().skip(start).take(end - start).collect();

        tracing::debug!(
            "Selected {} of {} '{}' rows for page {}",
            end - start,
            total,
            kind.index_space(),
            page
        );
        Ok((page_rows, total))
    }

    /// Index-then-fetch for one kind; `build` pairs each row with its payload
    async fn list<R, V, F>(
        &self,
        kind: RecordKind,
        page: u64,
        size: u64,
        options: &ListOptions,
        spaces: &[Space],
        mut build: F,
    ) -> QueryResult<Page<V>>
    where
        R: DeserializeOwned,
        F: FnMut(RecordId, R, Value, &Labels) -> V,
    {
        self.ensure_finalized().await?;
        let labels = self.labels(spaces).await?;
        let (rows, total) = self.select(kind, page, size, options, &labels).await?;

        let ids: Vec<RecordId> = rows.iter().map(|r| r.id).collect();
        let mut payloads: HashMap<RecordId, Value> = self
            .store
            .get_many(kind.payload_space(), &ids)
            .await?
            .into_iter()
            .map(|r| (r.id, r.value))
            .collect();

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let index: R = serde_json::from_value(row.value)?;
            let payload = payloads.remove(&row.id).unwrap_or(Value::Null);
            items.push(build(row.id, index, payload, &labels));
        }

        Ok(Page {
            items,
            pages: Page::<V>::page_count(total, size),
            total,
            current: page,
        })
    }

    /// Page of conformance tests
    pub async fn get_tests(
        &self,
        page: u64,
        size: u64,
        options: &ListOptions,
    ) -> QueryResult<Page<TestView>> {
        self.list(
            RecordKind::Test,
            page,
            size,
            options,
            &[Space::OperationIds, Space::Paths, Space::Methods, Space::TestKeys],
            test_view,
        )
        .await
    }

    /// Page of happy path scenarios
    pub async fn get_happy_paths(
        &self,
        page: u64,
        size: u64,
        options: &ListOptions,
    ) -> QueryResult<Page<HappyPathView>> {
        self.list(
            RecordKind::HappyPath,
            page,
            size,
            options,
            &[Space::OperationIds, Space::Paths, Space::Methods],
            |id, row: HappyPathRow, payload, labels| HappyPathView {
                id,
                operation_id: labels.label(Space::OperationIds, row.operation_id),
                path: labels.label(Space::Paths, row.path),
                method: labels.label(Space::Methods, row.method),
                payload,
            },
        )
        .await
    }

    /// Page of operations
    pub async fn get_operations(
        &self,
        page: u64,
        size: u64,
        options: &ListOptions,
    ) -> QueryResult<Page<OperationView>> {
        self.list(
            RecordKind::Operation,
            page,
            size,
            options,
            &[Space::OperationIds, Space::Paths, Space::Methods],
            |id, row: OperationRow, payload, labels| OperationView {
                id,
                operation_id: labels.label(Space::OperationIds, row.operation_id),
                path: labels.label(Space::Paths, row.path),
                method: labels.label(Space::Methods, row.method),
                payload,
            },
        )
        .await
    }

    async fn lookup(&self, kind: RecordKind, id: RecordId) -> QueryResult<(Value, Value)> {
        self.ensure_finalized().await?;

        let not_found = || QueryError::NotFound {
            space: kind.payload_space(),
            id,
        };
        let index = self
            .store
            .get(kind.index_space(), id)
            .await?
            .ok_or_else(not_found)?;
        let payload = self
            .store
            .get(kind.payload_space(), id)
            .await?
            .ok_or_else(not_found)?;
        Ok((index, payload))
    }

    /// One conformance test by id
    pub async fn get_test(&self, id: RecordId) -> QueryResult<TestView> {
        let (index, payload) = self.lookup(RecordKind::Test, id).await?;
        let labels = self
            .labels(&[Space::OperationIds, Space::Paths, Space::Methods, Space::TestKeys])
            .await?;
        Ok(test_view(id, serde_json::from_value(index)?, payload, &labels))
    }

    /// One happy path by id
    pub async fn get_happy_path(&self, id: RecordId) -> QueryResult<HappyPathView> {
        let (index, payload) = self.lookup(RecordKind::HappyPath, id).await?;
        let row: HappyPathRow = serde_json::from_value(index)?;
        let labels = self
            .labels(&[Space::OperationIds, Space::Paths, Space::Methods])
            .await?;
        Ok(HappyPathView {
            id,
            operation_id: labels.label(Space::OperationIds, row.operation_id),
            path: labels.label(Space::Paths, row.path),
            method: labels.label(Space::Methods, row.method),
            payload,
        })
    }

    /// All paths in lexicographic order
    pub async fn get_paths(&self) -> QueryResult<Vec<DictEntry>> {
        self.ensure_finalized().await?;
        self.dictionary(Space::Paths).await
    }

    /// HTTP methods in first-seen order
    pub async fn get_methods(&self) -> QueryResult<Vec<DictEntry>> {
        self.ensure_finalized().await?;
        self.dictionary(Space::Methods).await
    }

    /// Operation ids in lexicographic order
    pub async fn get_operation_ids(&self) -> QueryResult<Vec<DictEntry>> {
        self.ensure_finalized().await?;
        self.dictionary(Space::OperationIds).await
    }

    /// Test keys in first-seen order
    pub async fn get_test_keys(&self) -> QueryResult<Vec<DictEntry>> {
        self.ensure_finalized().await?;
        self.dictionary(Space::TestKeys).await
    }

    /// Scan version, summary, counts and run id of the ingested report
    pub async fn get_report_meta(&self) -> QueryResult<ReportMeta> {
        self.ensure_finalized().await?;
        let value = self
            .store
            .get_meta(ReportMeta::KEY)
            .await?
            .ok_or_else(|| {
                QueryError::Storage(crate::storage::StorageError::Corruption(
                    "finalized store has no report metadata".to_string(),
                ))
            })?;
        Ok(serde_json::from_value(value)?)
    }
}

fn test_view(id: RecordId, row: TestRow, payload: Value, labels: &Labels) -> TestView {
    TestView {
        id,
        operation_id: labels.label(Space::OperationIds, row.operation_id),
        path: labels.label(Space::Paths, row.path),
        method: labels.label(Space::Methods, row.method),
        test_key: row.test_key.map(|k| labels.label(Space::TestKeys, k)),
        criticality: row.criticality,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::driver::tests::TWO_OPERATIONS;
    use crate::ingest::{IngestOptions, ReportIngestor};
    use crate::query::criteria::{FilterValue, Operator};
    use crate::storage::{Compression, SqliteStore};

    async fn ingested() -> (Arc<SqliteStore>, ReportQuery) {
        let store = Arc::new(SqliteStore::in_memory(Compression::Lz4).unwrap());
        let mut ingestor = ReportIngestor::start(store.clone(), IngestOptions::default())
            .await
            .unwrap();
        for chunk in TWO_OPERATIONS.as_bytes().chunks(64) {
            ingestor.feed(chunk).await.unwrap();
        }
        ingestor.finish().await.unwrap();
        (store.clone(), ReportQuery::new(store))
    }

    #[tokio::test]
    async fn test_tests_by_criticality_desc() {
        let (_, query) = ingested().await;

        let options = ListOptions::default().sorted(SortSpec::desc("criticality"));
        let page = query.get_tests(0, 10, &options).await.unwrap();

        assert_eq!(page.total, 4);
        assert_eq!(page.pages, 1);
        assert_eq!(page.current, 0);

        let crit: Vec<u64> = page.items.iter().map(|t| t.criticality).collect();
        assert_eq!(crit, vec![5, 4, 1, 1]);

        let first = &page.items[0];
        assert_eq!(first.path, "/owners");
        assert_eq!(first.method, "post");
        assert_eq!(first.operation_id, "addOwner");
        assert_eq!(first.test_key.as_deref(), Some("body-missing"));
        assert_eq!(first.payload["outcome"]["criticality"], 5);

        // Equal criticality keeps insertion order
        assert_eq!(page.items[2].id, 0);
        assert_eq!(page.items[2].path, "/pets");
        assert_eq!(page.items[3].id, 3);
    }

    #[tokio::test]
    async fn test_pagination() {
        let (_, query) = ingested().await;
        let options = ListOptions::default();

        let first = query.get_tests(0, 3, &options).await.unwrap();
        assert_eq!((first.items.len(), first.pages, first.total), (3, 2, 4));

        let second = query.get_tests(1, 3, &options).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.current, 1);
        assert_eq!(second.items[0].id, 3);

        let beyond = query.get_tests(7, 3, &options).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 4);

        assert!(matches!(
            query.get_tests(0, 0, &options).await,
            Err(QueryError::InvalidPage(_))
        ));
    }

    #[tokio::test]
    async fn test_filters_combine_with_and() {
        let (_, query) = ingested().await;

        let options = ListOptions::default()
            .filter(Filter::eq("path", FilterValue::Text("/pets".to_string())))
            .filter(Filter::new("criticality", Operator::Gte, FilterValue::Number(2.0)));
        let page = query.get_tests(0, 10, &options).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].criticality, 4);

        let options = ListOptions::default()
            .filter(Filter::parse("testKey=auth-missing").unwrap());
        let page = query.get_tests(0, 10, &options).await.unwrap();
        let ids: Vec<RecordId> = page.items.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 3]);

        let options = ListOptions::default().filter(Filter::parse("path=/nowhere").unwrap());
        assert_eq!(query.get_tests(0, 10, &options).await.unwrap().total, 0);

        // Labels that look like numbers are never compared as raw ids
        let options = ListOptions::default().filter(Filter::parse("operationId=0").unwrap());
        assert_eq!(query.get_tests(0, 10, &options).await.unwrap().total, 0);
        let options = ListOptions::default()
            .filter(Filter::eq("path", FilterValue::Number(1.0)));
        assert_eq!(query.get_tests(0, 10, &options).await.unwrap().total, 0);

        let options = ListOptions::default().filter(Filter::parse("method<post").unwrap());
        assert!(matches!(
            query.get_tests(0, 10, &options).await,
            Err(QueryError::InvalidFilter(_))
        ));

        let options = ListOptions::default().filter(Filter::parse("color=red").unwrap());
        assert!(matches!(
            query.get_tests(0, 10, &options).await,
            Err(QueryError::InvalidFilter(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_sorted_by_path() {
        let (_, query) = ingested().await;

        let options = ListOptions::default().sorted(SortSpec::asc("path"));
        let page = query.get_operations(0, 10, &options).await.unwrap();
        let paths: Vec<&str> = page.items.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["/owners", "/pets"]);
        assert_eq!(page.items[1].payload["operationId"], "listPets");

        let happy = query
            .get_happy_paths(0, 10, &ListOptions::default())
            .await
            .unwrap();
        assert_eq!(happy.total, 2);
        assert_eq!(happy.items[0].operation_id, "listPets");
    }

    #[tokio::test]
    async fn test_lookups_and_dictionaries() {
        let (_, query) = ingested().await;

        let test = query.get_test(1).await.unwrap();
        assert_eq!(test.criticality, 4);
        assert_eq!(test.test_key.as_deref(), Some("param-invalid"));

        let happy = query.get_happy_path(1).await.unwrap();
        assert_eq!(happy.path, "/owners");

        assert!(matches!(
            query.get_test(99).await,
            Err(QueryError::NotFound { space: Space::Tests, id: 99 })
        ));

        let paths: Vec<String> = query.get_paths().await.unwrap().into_iter().map(|e| e.value).collect();
        assert_eq!(paths, vec!["/owners", "/pets"]);

        let methods: Vec<String> = query.get_methods().await.unwrap().into_iter().map(|e| e.value).collect();
        assert_eq!(methods, vec!["get", "post"]);

        let ops = query.get_operation_ids().await.unwrap();
        assert_eq!(ops[0].value, "addOwner");
        assert_eq!(query.get_test_keys().await.unwrap().len(), 3);

        let meta = query.get_report_meta().await.unwrap();
        assert_eq!(meta.counts.happy_paths, 2);
        assert_eq!(meta.summary.unwrap()["totalTests"], 4);
    }

    #[tokio::test]
    async fn test_unfinalized_store_is_rejected() {
        let store = Arc::new(SqliteStore::in_memory(Compression::Lz4).unwrap());
        let query = ReportQuery::new(store.clone());

        assert!(matches!(
            query.get_paths().await,
            Err(QueryError::NotFinalized(StoreState::Empty))
        ));

        let mut ingestor = ReportIngestor::start(store, IngestOptions::default())
            .await
            .unwrap();
        ingestor.feed(TWO_OPERATIONS.as_bytes()).await.unwrap();

        // Payloads are flushed but the run is still open
        assert!(matches!(
            query.get_tests(0, 10, &ListOptions::default()).await,
            Err(QueryError::NotFinalized(StoreState::Ingesting))
        ));
        assert!(matches!(
            query.get_test(0).await,
            Err(QueryError::NotFinalized(StoreState::Ingesting))
        ));
    }
}
