//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default number of tables migrated at the same time.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

/// Default rows per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub source: SourceConfig,

    /// Target database configuration (MongoDB).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    #[serde(default = "default_localhost")]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Username.
    #[serde(default = "default_mysql_user")]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database name.
    pub database: String,

    /// Single table to migrate. When unset every table is migrated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("table", &self.table)
            .finish()
    }
}

/// Target database (MongoDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    #[serde(default = "default_localhost")]
    pub host: String,

    /// Database port (default: 27017).
    #[serde(default = "default_mongo_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Destination collection for single-table mode (default: source table name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Username (optional; MongoDB commonly runs without auth locally).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("table", &self.table)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Maximum number of tables migrated concurrently.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Rows per chunk read from the source and inserted at once.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Suppress progress output.
    #[serde(default)]
    pub silent: bool,

    /// Order each range scan by the table's primary key.
    #[serde(default)]
    pub stable_order: bool,

    /// Tables to include (glob patterns, bulk mode only).
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns, bulk mode only).
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Drop each destination collection before copying into it.
    #[serde(default)]
    pub drop_existing: bool,

    /// Per-operation timeout in seconds. No timeout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_secs: Option<u64>,

    /// Treat any failed table as a failed run in bulk mode.
    #[serde(default)]
    pub strict: bool,

    /// Maximum MySQL connections in the source pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_source_connections: Option<usize>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            silent: false,
            stable_order: false,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            drop_existing: false,
            operation_timeout_secs: None,
            strict: false,
            max_source_connections: None,
        }
    }
}

impl MigrationConfig {
    /// Operation timeout as a `Duration`.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// Source pool size. Every concurrently running table holds at most one
    /// source connection at a time, plus one for the validator's count.
    pub fn get_max_source_connections(&self) -> usize {
        self.max_source_connections
            .unwrap_or(self.concurrency_limit + 1)
            .max(1)
    }
}

// Default value functions for serde
fn default_localhost() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_mongo_port() -> u16 {
    27017
}

fn default_mysql_user() -> String {
    "root".to_string()
}

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
