//! Bulk inserts of whole chunks into the target.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::run_bounded;
use crate::core::Chunk;
use crate::error::{MigrateError, Result};
use crate::target::TargetWriter;

/// Outcome of one chunk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// Documents the target accepted.
    pub inserted: u64,
}

/// Writes one chunk at a time into a pre-created collection.
#[derive(Clone)]
pub struct ChunkWriter {
    target: Arc<dyn TargetWriter>,
    timeout: Option<Duration>,
}

impl ChunkWriter {
    /// Create a writer over a shared target connection.
    pub fn new(target: Arc<dyn TargetWriter>, timeout: Option<Duration>) -> Self {
        Self { target, timeout }
    }

    /// Create the destination collection (no-op when it exists), dropping
    /// it first when `drop_existing` is set.
    pub async fn prepare(&self, collection: &str, drop_existing: bool) -> Result<()> {
        if drop_existing {
            debug!("Dropping collection {}", collection);
            self.bounded(collection, "drop collection", self.target.drop_collection(collection))
                .await?;
        }
        self.bounded(
            collection,
            "create collection",
            self.target.create_collection(collection),
        )
        .await
    }

    /// Insert the whole chunk as a single bulk operation.
    ///
    /// The chunk is moved into the call so its rows are released as soon as
    /// the insert returns, successful or not.
    pub async fn write(&self, collection: &str, chunk: Chunk) -> Result<WriteResult> {
        if chunk.is_empty() {
            return Ok(WriteResult { inserted: 0 });
        }

        let write_start = Instant::now();
        let rows = chunk.len();

        let inserted = self
            .bounded(
                collection,
                "target insert",
                self.target.insert_chunk(collection, chunk),
            )
            .await?;

        debug!(
            "{}: inserted {} of {} rows in {:?}",
            collection,
            inserted,
            rows,
            write_start.elapsed()
        );

        Ok(WriteResult { inserted })
    }

    async fn bounded<T>(
        &self,
        collection: &str,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        run_bounded(self.timeout, operation, fut)
            .await
            .map_err(|e| match e {
                e @ MigrateError::DestInsert { .. } => e,
                e => MigrateError::dest_insert(collection, e),
            })
    }
}
