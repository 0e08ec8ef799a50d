//! Record store interface
//!
//! The ingestion driver writes through this trait and the query layer reads
//! through it, so either side can be exercised against any backend.

use crate::index::RecordId;
use crate::storage::error::StorageResult;
use crate::storage::types::{SortOrder, Space, StoreState, StoredRecord};
use async_trait::async_trait;
use serde_json::Value;

/// Persisted record spaces plus run metadata
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upsert records into a space (same id overwrites)
    async fn bulk_put(&self, space: Space, records: &[StoredRecord]) -> StorageResult<()>;

    /// Fetch one record value
    async fn get(&self, space: Space, id: RecordId) -> StorageResult<Option<Value>>;

    /// Fetch several records in the order of `ids`; missing ids are skipped
    async fn get_many(&self, space: Space, ids: &[RecordId]) -> StorageResult<Vec<StoredRecord>>;

    /// Remove every record of a space
    async fn clear(&self, space: Space) -> StorageResult<()>;

    /// All rows of an indexed space ordered by `field`, ties by ascending id
    ///
    /// `None` orders by id alone.
    async fn order_by(
        &self,
        space: Space,
        field: Option<&str>,
        order: SortOrder,
    ) -> StorageResult<Vec<StoredRecord>>;

    async fn count(&self, space: Space) -> StorageResult<u64>;

    async fn state(&self) -> StorageResult<StoreState>;

    async fn set_state(&self, state: StoreState) -> StorageResult<()>;

    async fn get_meta(&self, key: &str) -> StorageResult<Option<Value>>;

    async fn put_meta(&self, key: &str, value: &Value) -> StorageResult<()>;

    /// Drop all spaces and metadata ahead of a new run
    async fn reset(&self) -> StorageResult<()> {
        for &space in Space::all() {
            self.clear(space).await?;
        }
        self.set_state(StoreState::Empty).await
    }
}
