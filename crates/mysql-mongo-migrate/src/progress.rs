//! Progress notifications for running migrations.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::core::TableSpec;

/// A progress notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent<'a> {
    /// One chunk was acknowledged by the target.
    ChunkWritten {
        table: &'a TableSpec,
        inserted: u64,
        total: u64,
    },
    /// A table reached DONE or FAILED.
    TableFinished {
        table: &'a TableSpec,
        status: &'a str,
        remaining: usize,
    },
}

/// Emits progress lines unless silenced.
///
/// Holds the count of tables still to finish; it is the only mutable state
/// shared by the table tasks.
#[derive(Debug)]
pub struct ProgressReporter {
    silent: bool,
    json_lines: bool,
    remaining: AtomicUsize,
}

impl ProgressReporter {
    /// Create a reporter for `tables` tables.
    pub fn new(tables: usize, silent: bool) -> Self {
        Self {
            silent,
            json_lines: false,
            remaining: AtomicUsize::new(tables),
        }
    }

    /// Also print every event as a JSON line on stderr.
    pub fn with_json_lines(mut self, enabled: bool) -> Self {
        self.json_lines = enabled;
        self
    }

    /// Tables not yet finished.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Relaxed)
    }

    /// Report a written chunk.
    pub fn chunk_written(&self, table: &TableSpec, inserted: u64, total: u64) {
        if self.silent {
            return;
        }
        info!("{}: inserted {} rows ({} total)", table, inserted, total);
        self.emit_json(&ProgressEvent::ChunkWritten {
            table,
            inserted,
            total,
        });
    }

    /// Report a finished table and return how many remain.
    pub fn table_finished(&self, table: &TableSpec, status: &str) -> usize {
        let remaining = self
            .remaining
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1);
        if !self.silent {
            info!("{}: {} ({} tables remaining)", table, status, remaining);
            self.emit_json(&ProgressEvent::TableFinished {
                table,
                status,
                remaining,
            });
        }
        remaining
    }

    fn emit_json(&self, event: &ProgressEvent<'_>) {
        if !self.json_lines {
            return;
        }
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_counts_down() {
        let reporter = ProgressReporter::new(3, true);
        let table = TableSpec::mirrored("users");
        assert_eq!(reporter.table_finished(&table, "done"), 2);
        assert_eq!(reporter.table_finished(&table, "failed"), 1);
        assert_eq!(reporter.remaining(), 1);
    }

    #[test]
    fn test_event_json_shape() {
        let table = TableSpec::mirrored("users");
        let event = ProgressEvent::ChunkWritten {
            table: &table,
            inserted: 3,
            total: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "chunk_written");
        assert_eq!(json["table"]["source"], "users");
        assert_eq!(json["inserted"], 3);
    }
}
