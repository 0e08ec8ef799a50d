//! Scan report ingestion
//!
//! - **report**: subscriptions, the match handler and index row types
//! - **driver**: `ReportIngestor`, chunk feeding, flushing and finalize
//! - **error**: Error types and run states
//!
//! # Example
//!
//! ```rust,no_run
//! use scanstore::ingest::{IngestOptions, ReportIngestor};
//! use scanstore::storage::{Compression, SqliteStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("./report.db".as_ref(), Compression::Lz4)?);
//!
//!     let mut ingestor = ReportIngestor::start(store, IngestOptions::default()).await?;
//!     ingestor.ingest_file("./scan-report.json".as_ref()).await?;
//!     let stats = ingestor.finish().await?;
//!
//!     println!("{} tests ingested", stats.tests);
//!     Ok(())
//! }
//! ```

pub mod driver;
pub mod error;
pub mod report;

pub use driver::{IngestOptions, IngestStats, ReportIngestor, DEFAULT_CHUNK_SIZE};
pub use error::{IngestError, IngestResult, IngestState};
pub use report::{
    HappyPathRow, OperationRow, ReportBuilder, ReportCounts, ReportField, ReportMeta, TestRow,
    REPORT_SUBSCRIPTIONS,
};
