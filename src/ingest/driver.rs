//! Report ingestion driver
//!
//! Feeds chunks through the streaming matcher into a [`ReportBuilder`],
//! flushes payloads after every chunk and reconciles everything at
//! [`ReportIngestor::finish`].
//!
//! # Lifecycle
//!
//! ```text
//! start ──→ Streaming ──feed*──→ Streaming ──finish──→ Finalizing ──→ Done
//!               │                                        │    ↑
//!               │                              store error└────┘ finish again
//!               └──────────── fatal error ──→ Failed ←──────┘
//! ```
//!
//! The store is flagged `ingesting` from `start` until the very last step of
//! `finish`, so a run that dies midway never leaves a queryable store.

use crate::index::{Collection, DictEntry, Record, StringIndex};
use crate::ingest::error::{IngestError, IngestResult, IngestState};
use crate::ingest::report::{ReportBuilder, ReportField, ReportMeta, REPORT_SUBSCRIPTIONS};
use crate::storage::{RecordStore, Space, StoreState, StoredRecord};
use crate::stream::StreamParser;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// Default bytes per chunk when reading files
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Tunables of one run
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Bytes per chunk for `ingest_file`
    pub chunk_size: usize,
    /// Flush payload buffers after every chunk
    pub flush_every_chunk: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            flush_every_chunk: true,
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub run_id: String,
    pub chunks: u64,
    pub bytes: u64,
    pub operations: u64,
    pub tests: u64,
    pub happy_paths: u64,
    pub flushes: u64,
    pub elapsed_ms: u64,
}

/// Single-writer ingestion of one report into a store
pub struct ReportIngestor {
    store: Arc<dyn RecordStore>,
    parser: StreamParser<ReportField>,
    report: ReportBuilder,
    state: IngestState,
    options: IngestOptions,
    stats: IngestStats,
    run_id: Uuid,
    started: Instant,
}

fn to_records<T: Serialize>(records: &[Record<T>]) -> IngestResult<Vec<StoredRecord>> {
    records
        .iter()
        .map(|r| StoredRecord::from_serialize(r.id, &r.value))
        .collect::<Result<_, _>>()
        .map_err(|e| IngestError::Storage(e.into()))
}

fn dictionary_records(entries: Vec<DictEntry>) -> IngestResult<Vec<StoredRecord>> {
    entries
        .iter()
        .map(|e| StoredRecord::from_serialize(u64::from(e.id), e))
        .collect::<Result<_, _>>()
        .map_err(|e| IngestError::Storage(e.into()))
}

impl ReportIngestor {
    /// Clear the store and begin a new run
    pub async fn start(store: Arc<dyn RecordStore>, options: IngestOptions) -> IngestResult<Self> {
        if options.chunk_size == 0 {
            return Err(IngestError::Config("chunk size must be positive".to_string()));
        }

        let parser = StreamParser::from_patterns(REPORT_SUBSCRIPTIONS)?;
        let run_id = Uuid::new_v4();

        store.reset().await?;
        store.set_state(StoreState::Ingesting).await?;

        tracing::info!(run_id = %run_id, "Starting report ingestion");

        Ok(Self {
            store,
            parser,
            report: ReportBuilder::new(),
            state: IngestState::Streaming,
            options,
            stats: IngestStats {
                run_id: run_id.to_string(),
                ..Default::default()
            },
            run_id,
            started: Instant::now(),
        })
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Counters so far
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    fn ensure_streaming(&self, action: &'static str) -> IngestResult<()> {
        if self.state != IngestState::Streaming {
            return Err(IngestError::InvalidState {
                state: self.state,
                action,
            });
        }
        Ok(())
    }

    fn fail(&mut self, err: IngestError) -> IngestError {
        tracing::error!(run_id = %self.run_id, "Ingestion failed: {}", err);
        self.state = IngestState::Failed;
        err
    }

    /// Parse one chunk; every match it triggers is handled before this returns
    ///
    /// A parse or projection error is fatal. A flush error is not: the
    /// buffers are kept and the next `feed`, `flush` or `finish` retries.
    pub async fn feed(&mut self, chunk: &[u8]) -> IngestResult<()> {
        self.ensure_streaming("feed")?;

        if let Err(e) = self.parser.feed(chunk, &mut self.report) {
            return Err(self.fail(e));
        }
        self.stats.chunks += 1;
        self.stats.bytes += chunk.len() as u64;

        if self.options.flush_every_chunk {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write buffered test and happy path payloads, trimming only what the
    /// store acknowledged
    pub async fn flush(&mut self) -> IngestResult<()> {
        let flushed = flush_collection(&*self.store, Space::Tests, &mut self.report.tests).await?
            + flush_collection(&*self.store, Space::HappyPaths, &mut self.report.happy_paths).await?;

        if flushed > 0 {
            self.stats.flushes += 1;
            tracing::debug!("Flushed {} payloads", flushed);
        }
        Ok(())
    }

    /// Consume a stream of byte chunks
    pub async fn feed_stream<St, B, E>(&mut self, stream: St) -> IngestResult<()>
    where
        St: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<IngestError>,
    {
        futures_util::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            // A lost chunk leaves a gap in the document
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.fail(e.into())),
            };
            self.feed(chunk.as_ref()).await?;
        }
        Ok(())
    }

    /// Read a report file in `chunk_size` pieces
    pub async fn ingest_file(&mut self, path: &Path) -> IngestResult<()> {
        let file = tokio::fs::File::open(path).await?;
        let chunk_size = self.options.chunk_size;

        tracing::info!("Reading {:?} in {} byte chunks", path, chunk_size);

        let chunks = futures_util::stream::unfold(file, move |mut file| async move {
            let mut buf = vec![0u8; chunk_size];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok::<_, std::io::Error>(buf), file))
                }
                Err(e) => Some((Err(e), file)),
            }
        });

        self.feed_stream(chunks).await
    }

    /// Reconcile dictionaries, write indices and metadata, mark the store
    /// finalized
    ///
    /// A store error leaves the run in `Finalizing` and `finish` may be
    /// called again; every write is an upsert. Parse and resolution errors
    /// are fatal.
    pub async fn finish(&mut self) -> IngestResult<IngestStats> {
        if !matches!(self.state, IngestState::Streaming | IngestState::Finalizing) {
            return Err(IngestError::InvalidState {
                state: self.state,
                action: "finish",
            });
        }
        self.state = IngestState::Finalizing;

        match self.finalize().await {
            Ok(()) => {
                self.state = IngestState::Done;
                self.stats.elapsed_ms = self.started.elapsed().as_millis() as u64;
                tracing::info!(
                    run_id = %self.run_id,
                    operations = self.stats.operations,
                    tests = self.stats.tests,
                    happy_paths = self.stats.happy_paths,
                    "Ingestion finished in {}ms",
                    self.stats.elapsed_ms
                );
                Ok(self.stats.clone())
            }
            Err(e @ IngestError::Storage(_)) => {
                tracing::warn!(run_id = %self.run_id, "Finalize interrupted, retry finish: {}", e);
                Err(e)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn finalize(&mut self) -> IngestResult<()> {
        let store = Arc::clone(&self.store);

        // Truncated input must surface before anything is resolved
        if !self.parser.is_closed() {
            self.parser.end(&mut self.report)?;
        }

        // Payloads still buffered (flush disabled or last flush failed)
        self.flush().await?;

        self.report.sorted.sort_all();

        let resolver = self.report.resolver();
        let operation_rows = self.report.operations.flatten(&resolver)?;
        let test_rows = self.report.test_index.flatten(&resolver)?;
        let happy_path_rows = self.report.happy_path_index.flatten(&resolver)?;

        let operations: Vec<StoredRecord> = self
            .report
            .operations
            .objects()
            .iter()
            .map(|r| StoredRecord::new(r.id, r.value.value.clone()))
            .collect();
        store.bulk_put(Space::Operations, &operations).await?;

        for (&space, dictionary) in self.report.sorted.iter() {
            store
                .bulk_put(space, &dictionary_records(dictionary.entries())?)
                .await?;
        }
        for (&space, dictionary) in self.report.arrival.iter() {
            store
                .bulk_put(space, &dictionary_records(dictionary.entries())?)
                .await?;
        }

        store
            .bulk_put(Space::OperationsIndex, &to_records(&operation_rows)?)
            .await?;
        store.bulk_put(Space::TestsIndex, &to_records(&test_rows)?).await?;
        store
            .bulk_put(Space::HappyPathsIndex, &to_records(&happy_path_rows)?)
            .await?;

        let counts = self.report.counts();
        let meta = ReportMeta {
            scan_version: self.report.scan_version.clone(),
            summary: self.report.summary.clone(),
            counts,
            run_id: self.run_id.to_string(),
            ingested_at: Utc::now(),
        };
        let meta_value = serde_json::to_value(&meta).map_err(|e| IngestError::Storage(e.into()))?;
        store.put_meta(ReportMeta::KEY, &meta_value).await?;
        store.set_state(StoreState::Finalized).await?;

        self.stats.operations = counts.operations;
        self.stats.tests = counts.tests;
        self.stats.happy_paths = counts.happy_paths;

        // Release dictionaries and index buffers
        self.report = ReportBuilder::new();
        Ok(())
    }
}

async fn flush_collection(
    store: &dyn RecordStore,
    space: Space,
    collection: &mut Collection<Value>,
) -> IngestResult<usize> {
    if collection.is_empty() {
        return Ok(0);
    }

    let records: Vec<StoredRecord> = collection
        .objects()
        .iter()
        .map(|r| StoredRecord::new(r.id, r.value.clone()))
        .collect();

    if let Err(e) = store.bulk_put(space, &records).await {
        tracing::warn!("Flush to '{}' failed, keeping {} records: {}", space, records.len(), e);
        return Err(e.into());
    }

    collection.trim();
    Ok(records.len())
}
