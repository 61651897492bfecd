//! Document store target access.

mod mongo;

pub use mongo::{chunk_to_documents, MongoTarget};

use async_trait::async_trait;

use crate::core::Chunk;
use crate::error::Result;

/// Trait for target (document store) operations.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Make sure the target database exists. Idempotent.
    async fn ensure_database(&self) -> Result<()>;

    /// Create an empty collection. A no-op when it already exists.
    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Drop a collection if it exists.
    async fn drop_collection(&self, collection: &str) -> Result<()>;

    /// Insert every row of the chunk in one bulk operation.
    ///
    /// Returns the number of documents the store accepted. The chunk is
    /// consumed, so its rows are released when the call returns.
    async fn insert_chunk(&self, collection: &str, chunk: Chunk) -> Result<u64>;

    /// Count documents in a collection.
    async fn count_documents(&self, collection: &str) -> Result<i64>;

    /// Round-trip a trivial command.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}
