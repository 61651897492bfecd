//! Post-migration row count validation.
//!
//! A table is validated once, after its last chunk write was acknowledged:
//! one count against the source and one against the target, issued
//! concurrently. A mismatch is diagnostic; the copy itself already finished.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::TableSpec;
use crate::error::ErrorKind;
use crate::source::SourceReader;
use crate::target::TargetWriter;
use crate::transfer::run_bounded;

/// Count comparison for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Table that was compared.
    pub table: TableSpec,
    /// Rows in the source table, or -1 if the count failed.
    pub source_count: i64,
    /// Documents in the target collection, or -1 if the count failed.
    pub dest_count: i64,
    /// Whether both counts were obtained and are equal.
    pub ok: bool,
    /// Count failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    /// Build a result from two successful counts.
    pub fn new(table: TableSpec, source_count: i64, dest_count: i64) -> Self {
        Self {
            table,
            source_count,
            dest_count,
            ok: source_count == dest_count,
            error: None,
        }
    }

    /// Build a failed result when a count query did not succeed.
    pub fn failed(table: TableSpec, source_count: i64, dest_count: i64, error: String) -> Self {
        Self {
            table,
            source_count,
            dest_count,
            ok: false,
            error: Some(error),
        }
    }

    /// `ValidationMismatch` when the counts differ, `None` when they match.
    pub fn problem(&self) -> Option<ErrorKind> {
        (!self.ok).then_some(ErrorKind::ValidationMismatch)
    }
}

/// Compares source and target row counts.
#[derive(Clone)]
pub struct Validator {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    timeout: Option<Duration>,
}

impl Validator {
    /// Create a validator over shared connections.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            source,
            target,
            timeout,
        }
    }

    /// Count both sides concurrently and compare.
    pub async fn compare(&self, table: &TableSpec) -> ValidationResult {
        let (source_count, dest_count) = tokio::join!(
            run_bounded(
                self.timeout,
                "source count",
                self.source.count_rows(&table.source)
            ),
            run_bounded(
                self.timeout,
                "target count",
                self.target.count_documents(&table.dest)
            ),
        );

        let result = match (source_count, dest_count) {
            (Ok(s), Ok(d)) => ValidationResult::new(table.clone(), s, d),
            (s, d) => {
                let errors: Vec<String> = [s.as_ref().err(), d.as_ref().err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect();
                ValidationResult::failed(
                    table.clone(),
                    *s.as_ref().unwrap_or(&-1),
                    *d.as_ref().unwrap_or(&-1),
                    errors.join("; "),
                )
            }
        };

        match (result.problem(), &result.error) {
            (None, _) => info!("{}: {} rows (match)", table, result.source_count),
            (Some(_), Some(e)) => warn!("{}: VALIDATION FAILED: {}", table, e),
            (Some(kind), None) => warn!(
                "{}: source={} target={} ({})",
                table, result.source_count, result.dest_count, kind
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_counts_are_ok() {
        let result = ValidationResult::new(TableSpec::mirrored("users"), 3, 3);
        assert!(result.ok);
        assert_eq!(result.problem(), None);
    }

    #[test]
    fn test_mismatch_is_reported() {
        let result = ValidationResult::new(TableSpec::mirrored("orders"), 1000, 995);
        assert!(!result.ok);
        assert_eq!(result.problem(), Some(ErrorKind::ValidationMismatch));
    }

    #[test]
    fn test_zero_rows_trivially_ok() {
        assert!(ValidationResult::new(TableSpec::mirrored("empty"), 0, 0).ok);
    }

    #[test]
    fn test_failed_count_is_not_ok() {
        let result =
            ValidationResult::failed(TableSpec::mirrored("t"), 10, -1, "timeout".to_string());
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("timeout"));
    }
}
