//! Offset/limit range scans over one source table.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::run_bounded;
use crate::core::{Chunk, TableSpec};
use crate::error::{MigrateError, Result};
use crate::source::SourceReader;

/// Reads one bounded chunk at a time from the source.
#[derive(Clone)]
pub struct ChunkReader {
    source: Arc<dyn SourceReader>,
    timeout: Option<Duration>,
}

impl ChunkReader {
    /// Create a reader over a shared source connection.
    pub fn new(source: Arc<dyn SourceReader>, timeout: Option<Duration>) -> Self {
        Self { source, timeout }
    }

    /// Read up to `chunk_size` rows at `offset`.
    ///
    /// An empty chunk means the table is exhausted. Any failure, including
    /// a timeout, is reported as a source query error for this table.
    pub async fn read(
        &self,
        table: &TableSpec,
        offset: u64,
        chunk_size: usize,
        order_by: &[String],
    ) -> Result<Chunk> {
        let read_start = Instant::now();

        let chunk = run_bounded(
            self.timeout,
            "source read",
            self.source
                .read_chunk(&table.source, offset, chunk_size, order_by),
        )
        .await
        .map_err(|e| match e {
            e @ MigrateError::SourceQuery { .. } => e,
            e => MigrateError::source_query(&table.source, e),
        })?;

        debug!(
            "{}: read {} rows at offset {} in {:?}",
            table,
            chunk.len(),
            offset,
            read_start.elapsed()
        );

        Ok(chunk)
    }

    /// Primary key columns used to order scans, when stable ordering is on.
    pub async fn primary_key(&self, table: &TableSpec) -> Result<Vec<String>> {
        run_bounded(
            self.timeout,
            "primary key lookup",
            self.source.primary_key(&table.source),
        )
        .await
        .map_err(|e| match e {
            e @ MigrateError::SourceQuery { .. } => e,
            e => MigrateError::source_query(&table.source, e),
        })
    }
}
