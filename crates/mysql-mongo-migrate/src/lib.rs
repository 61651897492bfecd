//! # mysql-mongo-migrate
//!
//! Chunked MySQL to MongoDB migration library.
//!
//! Each source table is copied into a collection of the same name (or one
//! explicitly named collection in single-table mode) by a sequential
//! read/write loop over fixed-size offset windows:
//!
//! - **Bounded concurrency**: at most `concurrency_limit` tables in flight
//! - **Bounded memory**: one chunk per running table
//! - **Validation**: source and target row counts compared per table
//! - **Failure isolation**: a failed table never stops its siblings
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_mongo_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mysql_mongo_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(CancellationToken::new(), false).await?;
//!     println!("Migrated {} rows", result.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod source;
pub mod target;
pub mod transfer;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, MigrationMode, SourceConfig, TargetConfig};
pub use crate::core::{Chunk, MigrationCursor, Row, TableSpec, Value};
pub use error::{ErrorKind, MigrateError, Result};
pub use orchestrator::{
    HealthCheckResult, MigrationResult, Orchestrator, PlannedTable, Pools, RunStatus, TableFilter,
};
pub use progress::ProgressReporter;
pub use source::{MysqlSource, SourceReader};
pub use target::{MongoTarget, TargetWriter};
pub use transfer::{
    ChunkReader, ChunkWriter, MigrationOutcome, TableError, TableMigrator, TableStatus,
    TransferConfig, WriteResult,
};
pub use verify::{ValidationResult, Validator};
