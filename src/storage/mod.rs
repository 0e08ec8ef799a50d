//! Persisted record store
//!
//! - **types**: spaces, stored rows, sort order, store state
//! - **compression**: LZ4 + CRC32 payload blobs
//! - **store**: the async `RecordStore` trait
//! - **sqlite**: `SqliteStore`, the SQLite-backed implementation
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   payload → encode (JSON → LZ4, crc32) → payloads(space, id)
//!   index row → JSON text              → index_rows(space, id)
//!
//! Read Path:
//!   order_by(json_extract(field), id) → page of ids → get_many(payloads)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use scanstore::storage::{Compression, RecordStore, Space, SqliteStore, StoredRecord};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::open("./report.db".as_ref(), Compression::Lz4)?;
//!
//!     store
//!         .bulk_put(Space::Tests, &[StoredRecord::new(0, json!({"outcome": {"criticality": 4}}))])
//!         .await?;
//!
//!     let test = store.get(Space::Tests, 0).await?;
//!     println!("{:?}", test);
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod error;
pub mod sqlite;
pub mod store;
pub mod types;

pub use compression::{decode_payload, encode_payload, Compression};
pub use error::{StorageError, StorageResult};
pub use sqlite::SqliteStore;
pub use store::RecordStore;
pub use types::{SortOrder, Space, SpaceKind, StoreState, StoredRecord};
