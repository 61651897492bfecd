//! Relational source access.
//!
//! The engine only needs three primitives from the source (list tables,
//! offset/limit range scan, row count); everything else is optional support
//! for ordering, health checks and shutdown.

mod mysql;

pub use mysql::MysqlSource;

use async_trait::async_trait;

use crate::core::Chunk;
use crate::error::Result;

/// Read tables from a relational source.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// List the base tables of the configured database.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Read at most `limit` rows starting at `offset`.
    ///
    /// `order_by` lists the columns to sort by; when empty no ORDER BY is
    /// issued and rows come back in the store's natural order. An empty
    /// chunk means the offset is past the end of the table.
    async fn read_chunk(
        &self,
        table: &str,
        offset: u64,
        limit: usize,
        order_by: &[String],
    ) -> Result<Chunk>;

    /// Count rows in a table.
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Primary key columns of a table, in key order. Empty when there is none.
    async fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Round-trip a trivial query.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}
