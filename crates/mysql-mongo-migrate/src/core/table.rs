//! Migration units, row chunks and the per-table cursor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::value::Value;

/// One source table paired with its destination collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source table name.
    pub source: String,
    /// Destination collection name.
    pub dest: String,
}

impl TableSpec {
    /// Create an explicit source → destination pair.
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }

    /// Create a pair whose destination mirrors the source name (bulk mode).
    pub fn mirrored(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            dest: name.clone(),
            source: name,
        }
    }
}

impl fmt::Display for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source == self.dest {
            f.write_str(&self.source)
        } else {
            write!(f, "{} -> {}", self.source, self.dest)
        }
    }
}

/// A row: values in the column order of the chunk it belongs to.
pub type Row = Vec<Value>;

/// A bounded batch of rows read from one offset window of a source table.
///
/// Column names are shared by every row of the chunk, so a row is the
/// mapping `columns[i] -> row[i]`.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Offset of the first row in the source scan order.
    pub offset: u64,
    /// Column names, in select order.
    pub columns: Arc<Vec<String>>,
    /// Row data.
    pub rows: Vec<Row>,
}

impl Chunk {
    /// Create a chunk read at `offset`.
    pub fn new(offset: u64, columns: Arc<Vec<String>>, rows: Vec<Row>) -> Self {
        Self {
            offset,
            columns,
            rows,
        }
    }

    /// An exhausted read.
    pub fn empty(offset: u64) -> Self {
        Self {
            offset,
            ..Default::default()
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows as `(column, value)` pairs.
    pub fn records(&self) -> impl Iterator<Item = impl Iterator<Item = (&str, &Value)> + '_> + '_ {
        let columns: &[String] = &self.columns;
        self.rows
            .iter()
            .map(move |row| columns.iter().map(String::as_str).zip(row.iter()))
    }
}

/// Offset/limit cursor over one source table.
///
/// The offset only ever moves forward, and once a read comes back empty the
/// cursor is terminal.
#[derive(Debug, Clone)]
pub struct MigrationCursor {
    offset: u64,
    chunk_size: usize,
    exhausted: bool,
}

impl MigrationCursor {
    /// Start a cursor at offset 0.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            offset: 0,
            chunk_size: chunk_size.max(1),
            exhausted: false,
        }
    }

    /// Offset of the next read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Rows per read.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Whether a read has already come back empty.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Move past a chunk that has been written.
    pub fn advance(&mut self) {
        self.offset += self.chunk_size as u64;
    }

    /// Mark the scan as finished.
    pub fn exhaust(&mut self) {
        self.exhausted = true;
    }
}
