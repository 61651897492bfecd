//! Per-table transfer engine.
//!
//! A table is copied by a strictly sequential loop: read one chunk, write
//! it, advance the cursor, repeat until a read comes back empty, then
//! validate. Chunk N is acknowledged by the target before chunk N+1 is read,
//! so at most one chunk per table is in memory.

mod reader;
mod writer;

pub use reader::ChunkReader;
pub use writer::{ChunkWriter, WriteResult};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{MigrationConfig, DEFAULT_CHUNK_SIZE};
use crate::core::{Chunk, MigrationCursor, TableSpec};
use crate::error::{ErrorKind, MigrateError, Result};
use crate::progress::ProgressReporter;
use crate::source::SourceReader;
use crate::target::TargetWriter;
use crate::verify::{ValidationResult, Validator};

/// Await `fut`, failing with [`MigrateError::Timeout`] if it runs longer
/// than `timeout`. Without a timeout the future is awaited as is.
pub(crate) async fn run_bounded<T>(
    timeout: Option<Duration>,
    operation: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| MigrateError::Timeout {
                operation: operation.to_string(),
                seconds: limit.as_secs(),
            })?,
    }
}

/// Transfer settings shared by every table of a run.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per read and per bulk insert.
    pub chunk_size: usize,
    /// Order range scans by primary key.
    pub stable_order: bool,
    /// Drop each destination collection before copying into it.
    pub drop_existing: bool,
    /// Upper bound for each read, write and count.
    pub operation_timeout: Option<Duration>,
    /// Create (and optionally drop) the destination collection in INIT.
    /// Off when the caller prepared every collection up front.
    pub create_collections: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            stable_order: false,
            drop_existing: false,
            operation_timeout: None,
            create_collections: true,
        }
    }
}

impl From<&MigrationConfig> for TransferConfig {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            stable_order: config.stable_order,
            drop_existing: config.drop_existing,
            operation_timeout: config.operation_timeout(),
            create_collections: true,
        }
    }
}

/// Terminal status of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Every chunk was written and validation ran (match or not).
    Done,
    /// The table stopped early; see [`MigrationOutcome::error`].
    Failed,
}

impl TableStatus {
    /// Lower-case name used in logs and progress events.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Done => "done",
            TableStatus::Failed => "failed",
        }
    }
}

/// Why a table failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of migrating one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOutcome {
    /// Table pair.
    pub table: TableSpec,
    /// Final status.
    pub status: TableStatus,
    /// Documents the target acknowledged.
    pub rows_migrated: u64,
    /// Non-empty chunks written.
    pub chunks: u64,
    /// Count comparison; absent when the table failed before validating.
    pub validation: Option<ValidationResult>,
    /// Failure, if any.
    pub error: Option<TableError>,
    /// Wall time for this table.
    pub duration_seconds: f64,
}

impl MigrationOutcome {
    /// A failed outcome that never got to copy anything.
    pub fn failed(table: TableSpec, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            table,
            status: TableStatus::Failed,
            rows_migrated: 0,
            chunks: 0,
            validation: None,
            error: Some(TableError {
                kind,
                message: message.into(),
            }),
            duration_seconds: 0.0,
        }
    }

    /// Whether the table finished.
    pub fn is_done(&self) -> bool {
        self.status == TableStatus::Done
    }

    /// Whether the table finished but its counts disagree.
    pub fn is_mismatch(&self) -> bool {
        self.validation.as_ref().is_some_and(|v| !v.ok)
    }

    /// One-line summary, e.g. `users: 3 rows migrated, 3/3 (match)`.
    pub fn summary_line(&self) -> String {
        match (&self.status, &self.validation, &self.error) {
            (TableStatus::Failed, _, Some(err)) => format!(
                "{}: FAILED after {} rows ({}): {}",
                self.table, self.rows_migrated, err.kind, err.message
            ),
            (TableStatus::Failed, _, None) => {
                format!("{}: FAILED after {} rows", self.table, self.rows_migrated)
            }
            (TableStatus::Done, Some(v), _) if v.error.is_some() => format!(
                "{}: {} rows migrated, validation failed",
                self.table, self.rows_migrated
            ),
            (TableStatus::Done, Some(v), _) => format!(
                "{}: {} rows migrated, {}/{} ({})",
                self.table,
                self.rows_migrated,
                v.source_count,
                v.dest_count,
                if v.ok { "match" } else { "MISMATCH" }
            ),
            (TableStatus::Done, None, _) => {
                format!("{}: {} rows migrated", self.table, self.rows_migrated)
            }
        }
    }
}

/// Table migration states.
enum State {
    Init,
    Reading,
    Writing(Chunk),
    Validating,
    Done(ValidationResult),
    Failed(MigrateError),
}

/// Drives one table through INIT, READING/WRITING and VALIDATING.
pub struct TableMigrator {
    reader: ChunkReader,
    writer: ChunkWriter,
    validator: Validator,
    config: TransferConfig,
    progress: Arc<ProgressReporter>,
    cancel: CancellationToken,
}

impl TableMigrator {
    /// Create a migrator over shared connections.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        config: TransferConfig,
        progress: Arc<ProgressReporter>,
        cancel: CancellationToken,
    ) -> Self {
        let timeout = config.operation_timeout;
        Self {
            reader: ChunkReader::new(source.clone(), timeout),
            writer: ChunkWriter::new(target.clone(), timeout),
            validator: Validator::new(source, target, timeout),
            config,
            progress,
            cancel,
        }
    }

    /// Migrate one table. Never returns an error: failures are recorded in
    /// the outcome so sibling tables are unaffected.
    pub async fn run(&self, table: TableSpec) -> MigrationOutcome {
        let start = Instant::now();
        let mut cursor = MigrationCursor::new(self.config.chunk_size);
        let mut order_by: Vec<String> = Vec::new();
        let mut rows_migrated = 0u64;
        let mut chunks = 0u64;

        info!("{}: starting", table);

        let mut state = State::Init;
        let terminal: Result<ValidationResult> = loop {
            state = match state {
                State::Init => match self.init(&table).await {
                    Ok(keys) => {
                        order_by = keys;
                        State::Reading
                    }
                    Err(e) => State::Failed(e),
                },

                State::Reading => {
                    if self.cancel.is_cancelled() {
                        State::Failed(MigrateError::Cancelled)
                    } else {
                        match self
                            .reader
                            .read(&table, cursor.offset(), cursor.chunk_size(), &order_by)
                            .await
                        {
                            Ok(chunk) if chunk.is_empty() => {
                                cursor.exhaust();
                                State::Validating
                            }
                            Ok(chunk) => State::Writing(chunk),
                            Err(e) => State::Failed(e),
                        }
                    }
                }

                State::Writing(chunk) => match self.writer.write(&table.dest, chunk).await {
                    Ok(result) => {
                        cursor.advance();
                        chunks += 1;
                        rows_migrated += result.inserted;
                        self.progress
                            .chunk_written(&table, result.inserted, rows_migrated);
                        State::Reading
                    }
                    Err(e) => State::Failed(e),
                },

                State::Validating => {
                    debug_assert!(cursor.is_exhausted());
                    State::Done(self.validator.compare(&table).await)
                }

                State::Done(validation) => break Ok(validation),
                State::Failed(e) => break Err(e),
            };
        };

        let duration_seconds = start.elapsed().as_secs_f64();
        let mut outcome = MigrationOutcome {
            table,
            status: TableStatus::Done,
            rows_migrated,
            chunks,
            validation: None,
            error: None,
            duration_seconds,
        };

        match terminal {
            Ok(validation) => {
                debug!(
                    "{}: {} chunks in {:.2}s",
                    outcome.table, chunks, duration_seconds
                );
                outcome.validation = Some(validation);
            }
            Err(e) => {
                let kind = e.kind();
                if kind == ErrorKind::Cancelled {
                    warn!("{}: cancelled at offset {}", outcome.table, cursor.offset());
                } else {
                    error!("{}: MIGRATION FAILED ({}): {}", outcome.table, kind, e);
                }
                outcome.status = TableStatus::Failed;
                outcome.error = Some(TableError {
                    kind,
                    message: e.to_string(),
                });
            }
        }

        outcome
    }

    /// Prepare the destination collection and work out the scan order.
    async fn init(&self, table: &TableSpec) -> Result<Vec<String>> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        if self.config.create_collections {
            self.writer
                .prepare(&table.dest, self.config.drop_existing)
                .await?;
        }

        if !self.config.stable_order {
            return Ok(Vec::new());
        }

        let keys = self.reader.primary_key(table).await?;
        if keys.is_empty() {
            warn!(
                "{}: no primary key, reading in natural order",
                table.source
            );
        } else {
            debug!("{}: ordering by {}", table.source, keys.join(", "));
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_bounded_without_timeout() {
        let value = run_bounded(None, "noop", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_bounded_times_out() {
        let err = run_bounded(Some(Duration::from_secs(2)), "source read", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        match err {
            MigrateError::Timeout { operation, seconds } => {
                assert_eq!(operation, "source read");
                assert_eq!(seconds, 2);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_transfer_config_from_migration_config() {
        let migration = MigrationConfig {
            chunk_size: 500,
            stable_order: true,
            operation_timeout_secs: Some(30),
            ..Default::default()
        };
        let config = TransferConfig::from(&migration);
        assert_eq!(config.chunk_size, 500);
        assert!(config.stable_order);
        assert!(!config.drop_existing);
        assert!(config.create_collections);
        assert_eq!(config.operation_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_summary_lines() {
        let mut outcome = MigrationOutcome {
            table: TableSpec::mirrored("users"),
            status: TableStatus::Done,
            rows_migrated: 3,
            chunks: 1,
            validation: Some(ValidationResult::new(TableSpec::mirrored("users"), 3, 3)),
            error: None,
            duration_seconds: 0.1,
        };
        assert_eq!(outcome.summary_line(), "users: 3 rows migrated, 3/3 (match)");

        outcome.validation = Some(ValidationResult::new(TableSpec::mirrored("users"), 3, 2));
        assert!(outcome.is_mismatch());
        assert!(outcome.summary_line().ends_with("3/2 (MISMATCH)"));

        let failed = MigrationOutcome::failed(
            TableSpec::mirrored("orders"),
            ErrorKind::DestInsertError,
            "duplicate key",
        );
        assert!(!failed.is_done());
        assert!(!failed.is_mismatch());
        assert_eq!(
            failed.summary_line(),
            "orders: FAILED after 0 rows (destination insert error): duplicate key"
        );
    }
}
