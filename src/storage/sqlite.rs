//! SQLite record store
//!
//! One database file holds every space of a report:
//!
//! - `payloads`: compressed payload blobs, fetched by `(space, id)`
//! - `index_rows`: JSON text rows, ordered with `json_extract`
//! - `meta`: run metadata and the store state flag
//!
//! All tables are keyed by `(space, id)` so `bulk_put` is an upsert and a
//! retried flush simply overwrites what a failed one left behind.

use crate::index::RecordId;
use crate::storage::compression::{decode_payload, encode_payload, Compression};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::store::RecordStore;
use crate::storage::types::{SortOrder, Space, SpaceKind, StoreState, StoredRecord};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const STATE_KEY: &str = "state";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS payloads (
        space TEXT NOT NULL,
        id INTEGER NOT NULL,
        body BLOB NOT NULL,
        PRIMARY KEY (space, id)
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS index_rows (
        space TEXT NOT NULL,
        id INTEGER NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (space, id)
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// SQLite-backed [`RecordStore`]
///
/// The connection sits behind a `std::sync::Mutex`: statements are short and
/// never held across an await point.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    compression: Compression,
}

impl SqliteStore {
    /// Create or open a store file
    pub fn open(path: &Path, compression: Compression) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::init(conn, Some(path.to_path_buf()), compression)
    }

    /// Throwaway store for tests and dry runs
    pub fn in_memory(compression: Compression) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None, compression)
    }

    fn init(conn: Connection, path: Option<PathBuf>, compression: Compression) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            compression,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> StorageResult<T>) -> StorageResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        f(&mut conn)
    }
}

fn sql_id(id: RecordId) -> StorageResult<i64> {
    i64::try_from(id).map_err(|_| StorageError::Serialization(format!("record id {} out of range", id)))
}

fn record_id(raw: i64) -> StorageResult<RecordId> {
    RecordId::try_from(raw).map_err(|_| StorageError::Corruption(format!("negative record id {}", raw)))
}

fn decode_row(kind: SpaceKind, id: i64, body: RowBody) -> StorageResult<StoredRecord> {
    let value = match (kind, body) {
        (SpaceKind::Payload, RowBody::Blob(blob)) => decode_payload(&blob)?,
        (SpaceKind::Indexed, RowBody::Text(text)) => serde_json::from_str(&text)?,
        _ => return Err(StorageError::Corruption(format!("row {} has wrong column type", id))),
    };
    Ok(StoredRecord::new(record_id(id)?, value))
}

enum RowBody {
    Blob(Vec<u8>),
    Text(String),
}

fn read_body(kind: SpaceKind, row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<RowBody> {
    match kind {
        SpaceKind::Payload => row.get(idx).map(RowBody::Blob),
        SpaceKind::Indexed => row.get(idx).map(RowBody::Text),
    }
}

fn select_one_sql(kind: SpaceKind) -> &'static str {
    match kind {
        SpaceKind::Payload => "SELECT id, body FROM payloads WHERE space = ?1 AND id = ?2",
        SpaceKind::Indexed => "SELECT id, value FROM index_rows WHERE space = ?1 AND id = ?2",
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn bulk_put(&self, space: Space, records: &[StoredRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let compression = self.compression;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                match space.kind() {
                    SpaceKind::Payload => {
                        let mut stmt = tx.prepare_cached(
                            "INSERT OR REPLACE INTO payloads (space, id, body) VALUES (?1, ?2, ?3)",
                        )?;
                        for record in records {
                            let blob = encode_payload(&record.value, compression)?;
                            stmt.execute(params![space.name(), sql_id(record.id)?, blob])?;
                        }
                    }
                    SpaceKind::Indexed => {
                        let mut stmt = tx.prepare_cached(
                            "INSERT OR REPLACE INTO index_rows (space, id, value) VALUES (?1, ?2, ?3)",
                        )?;
                        for record in records {
                            let text = serde_json::to_string(&record.value)?;
                            stmt.execute(params![space.name(), sql_id(record.id)?, text])?;
                        }
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })?;

        tracing::trace!("Stored {} records in '{}'", records.len(), space);
        Ok(())
    }

    async fn get(&self, space: Space, id: RecordId) -> StorageResult<Option<Value>> {
        let kind = space.kind();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(select_one_sql(kind))?;
            let row = stmt
                .query_row(params![space.name(), sql_id(id)?], |row| {
                    Ok((row.get::<_, i64>(0)?, read_body(kind, row, 1)?))
                })
                .optional()?;

            match row {
                Some((raw_id, body)) => Ok(Some(decode_row(kind, raw_id, body)?.value)),
                None => Ok(None),
            }
        })
    }

    async fn get_many(&self, space: Space, ids: &[RecordId]) -> StorageResult<Vec<StoredRecord>> {
        let kind = space.kind();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(select_one_sql(kind))?;
            let mut records = Vec::with_capacity(ids.len());

            for &id in ids {
                let row = stmt
                    .query_row(params![space.name(), sql_id(id)?], |row| {
                        Ok((row.get::<_, i64>(0)?, read_body(kind, row, 1)?))
                    })
                    .optional()?;

                if let Some((raw_id, body)) = row {
                    records.push(decode_row(kind, raw_id, body)?);
                }
            }
            Ok(records)
        })
    }

    async fn clear(&self, space: Space) -> StorageResult<()> {
        let sql = match space.kind() {
            SpaceKind::Payload => "DELETE FROM payloads WHERE space = ?1",
            SpaceKind::Indexed => "DELETE FROM index_rows WHERE space = ?1",
        };
        self.with_conn(|conn| {
            conn.execute(sql, params![space.name()])?;
            Ok(())
        })
    }

    async fn order_by(
        &self,
        space: Space,
        field: Option<&str>,
        order: SortOrder,
    ) -> StorageResult<Vec<StoredRecord>> {
        if space.kind() != SpaceKind::Indexed {
            return Err(StorageError::Unsupported {
                space: space.name().to_string(),
                reason: "payload spaces cannot be ordered".to_string(),
            });
        }

        self.with_conn(|conn| {
            let rows: Vec<(i64, String)> = match field {
                Some(field) => {
                    let sql = format!(
                        "SELECT id, value FROM index_rows WHERE space = ?1
                         ORDER BY json_extract(value, '$.' || ?2) {}, id ASC",
                        order.as_sql()
                    );
                    let mut stmt = conn.prepare_cached(&sql)?;
                    let rows = stmt
                        .query_map(params![space.name(), field], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<Result<_, _>>()?;
                    rows
                }
                None => {
                    let sql = format!(
                        "SELECT id, value FROM index_rows WHERE space = ?1 ORDER BY id {}",
                        order.as_sql()
                    );
                    let mut stmt = conn.prepare_cached(&sql)?;
                    let rows = stmt
                        .query_map(params![space.name()], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<Result<_, _>>()?;
                    rows
                }
            };

            rows.into_iter()
                .map(|(id, text)| decode_row(SpaceKind::Indexed, id, RowBody::Text(text)))
                .collect()
        })
    }

    async fn count(&self, space: Space) -> StorageResult<u64> {
        let sql = match space.kind() {
            SpaceKind::Payload => "SELECT COUNT(*) FROM payloads WHERE space = ?1",
            SpaceKind::Indexed => "SELECT COUNT(*) FROM index_rows WHERE space = ?1",
        };
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(sql, params![space.name()], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    async fn state(&self) -> StorageResult<StoreState> {
        match self.get_meta(STATE_KEY).await? {
            Some(Value::String(s)) => s.parse().map_err(StorageError::Corruption),
            Some(other) => Err(StorageError::Corruption(format!(
                "store state is not a string: {}",
                other
            ))),
            None => Ok(StoreState::Empty),
        }
    }

    async fn set_state(&self, state: StoreState) -> StorageResult<()> {
        self.put_meta(STATE_KEY, &Value::String(state.as_str().to_string()))
            .await?;
        tracing::debug!("Store state set to {}", state);
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> StorageResult<Option<Value>> {
        self.with_conn(|conn| {
            let text: Option<String> = conn
                .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;

            match text {
                Some(text) => Ok(Some(serde_json::from_str(&text)?)),
                None => Ok(None),
            }
        })
    }

    async fn put_meta(&self, key: &str, value: &Value) -> StorageResult<()> {
        let text = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, text],
            )?;
            Ok(())
        })
    }

    async fn reset(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                DELETE FROM payloads;
                DELETE FROM index_rows;
                DELETE FROM meta;
                ",
            )?;
            Ok(())
        })
    }
}
