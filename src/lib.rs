//! # scanstore
//!
//! Streaming ingestion of API scan reports into a local record store, with
//! paginated, sortable and filterable queries over the result.
//!
//! ## Features
//!
//! - **Streaming matcher**: JSONPath-like subscriptions evaluated while the
//!   report is still being read, in constant memory per nesting level
//! - **Mutable-id dictionaries**: labels are interned during the stream and
//!   renumbered into lexicographic order once, at finalize
//! - **SQLite storage**: LZ4-compressed payloads beside small JSON index rows
//! - **Index-then-fetch queries**: only the payloads of one page are read
//!
//! ## Modules
//!
//! - [`stream`]: path patterns, push tokenizer and path tracker
//! - [`index`]: dictionaries and append-only collections
//! - [`storage`]: record store trait and the SQLite backend
//! - [`ingest`]: report projection and the ingestion driver
//! - [`query`]: pagination, sorting and filtering
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanstore::ingest::{IngestOptions, ReportIngestor};
//! use scanstore::query::{ListOptions, ReportQuery, SortSpec};
//! use scanstore::storage::{Compression, SqliteStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open(Path::new("report.db"), Compression::Lz4)?);
//!
//!     // Stream the report in chunks, then reconcile dictionaries and indices
//!     let mut ingestor = ReportIngestor::start(store.clone(), IngestOptions::default()).await?;
//!     ingestor.ingest_file(Path::new("scan-report.json")).await?;
//!     let stats = ingestor.finish().await?;
//!     println!("Ingested {} tests", stats.tests);
//!
//!     // Most critical tests first
//!     let query = ReportQuery::new(store);
//!     let options = ListOptions::default().sorted(SortSpec::desc("criticality"));
//!     let page = query.get_tests(0, 20, &options).await?;
//!     for test in page.items {
//!         println!("{} {} {}", test.criticality, test.method, test.path);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod ingest;
pub mod query;
pub mod storage;
pub mod stream;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, LoggingConfig};

pub use index::{Collection, DictEntry, DictionarySet, MutableId, RecordId, StringIndex};

pub use ingest::{IngestError, IngestOptions, IngestStats, ReportIngestor};

pub use query::{
    Filter, FilterValue, ListOptions, Operator, Page, QueryError, ReportQuery, SortSpec,
};

pub use storage::{Compression, RecordStore, SortOrder, SqliteStore, StorageError};

pub use stream::{PathPattern, StreamError, StreamParser};
