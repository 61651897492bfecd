//! Error types for the migration library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection setup or run-level setup failed (fatal to the whole run)
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Reading from a source table failed
    #[error("Source query failed for table {table}: {message}")]
    SourceQuery { table: String, message: String },

    /// Writing into a destination collection failed
    #[error("Destination insert failed for collection {table}: {message}")]
    DestInsert { table: String, message: String },

    /// A single operation exceeded the configured timeout
    #[error("Operation timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

/// Coarse error classification carried in per-table outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Aborts the whole run before any table starts.
    ConnectionError,
    /// Fatal to the owning table.
    SourceQueryError,
    /// Fatal to the owning table.
    DestInsertError,
    /// Diagnostic only; the copy itself completed.
    ValidationMismatch,
    /// The run was interrupted before the table finished.
    Cancelled,
    /// The table task died without producing an outcome.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ConnectionError => "connection error",
            ErrorKind::SourceQueryError => "source query error",
            ErrorKind::DestInsertError => "destination insert error",
            ErrorKind::ValidationMismatch => "validation mismatch",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a SourceQuery error
    pub fn source_query(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::SourceQuery {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a DestInsert error
    pub fn dest_insert(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::DestInsert {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Classify this error.
    ///
    /// Timeouts are classified by the caller, which knows which side of the
    /// transfer the operation belonged to; standing alone they count as a
    /// connection problem.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrateError::SourceQuery { .. } => ErrorKind::SourceQueryError,
            MigrateError::DestInsert { .. } => ErrorKind::DestInsertError,
            MigrateError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::ConnectionError,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Connection { .. } | MigrateError::Timeout { .. } => 3,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
