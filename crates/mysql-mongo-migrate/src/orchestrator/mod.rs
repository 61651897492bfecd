//! Migration orchestrator - main workflow coordinator.

mod filter;
mod pools;

pub use filter::TableFilter;
pub use pools::Pools;

use chrono::{DateTime, Utc};
use futures::stream::{self, FuturesUnordered, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MigrationMode};
use crate::core::TableSpec;
use crate::error::{ErrorKind, MigrateError, Result};
use crate::progress::ProgressReporter;
use crate::transfer::{ChunkWriter, MigrationOutcome, TableMigrator, TransferConfig};
use crate::verify::{ValidationResult, Validator};

/// Migration orchestrator.
///
/// Owns the shared connections for one run. Every entry point consumes the
/// orchestrator and closes both connections exactly once before returning.
pub struct Orchestrator {
    config: Config,
    pools: Pools,
    progress: bool,
}

/// Overall state of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every table reached DONE.
    Completed,
    /// At least one table FAILED; the others ran to completion.
    CompletedWithFailures,
    /// The run was interrupted.
    Cancelled,
    /// Nothing was written; see [`MigrationResult::plan`].
    DryRun,
}

/// A table a dry run would migrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTable {
    pub table: TableSpec,
    /// Source row count, or -1 when the count failed.
    pub source_rows: i64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// `bulk` or `single_table`.
    pub mode: String,

    /// Final status.
    pub status: RunStatus,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables dispatched.
    pub tables_total: usize,

    /// Tables that reached DONE.
    pub tables_success: usize,

    /// Tables that FAILED.
    pub tables_failed: usize,

    /// DONE tables whose counts disagree.
    pub validation_mismatches: usize,

    /// Documents written across all tables.
    pub rows_migrated: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// Names of failed tables.
    pub failed_tables: Vec<String>,

    /// Per-table outcomes, in completion order.
    pub outcomes: Vec<MigrationOutcome>,

    /// Planned tables (dry run only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<PlannedTable>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Process exit code for this run.
    ///
    /// A failed table only fails the process in single-table mode, or in
    /// bulk mode when `strict` is set.
    pub fn exit_code(&self, strict: bool) -> u8 {
        match self.status {
            RunStatus::Cancelled => 130,
            RunStatus::CompletedWithFailures if strict || self.mode == "single_table" => 1,
            _ => 0,
        }
    }
}

/// Connection health of both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
}

impl Orchestrator {
    /// Connect to both sides and create an orchestrator.
    pub async fn new(config: Config) -> Result<Self> {
        let pools = Pools::connect(&config).await?;
        Ok(Self::with_pools(config, pools))
    }

    /// Create an orchestrator over already-open connections.
    pub fn with_pools(config: Config, pools: Pools) -> Self {
        Self {
            config,
            pools,
            progress: false,
        }
    }

    /// Print progress events as JSON lines on stderr.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Run the migration (or only plan it, when `dry_run` is set).
    pub async fn run(self, cancel: CancellationToken, dry_run: bool) -> Result<MigrationResult> {
        let result = self.execute(cancel, dry_run).await;
        self.pools.close().await;
        result
    }

    /// Run like [`Orchestrator::run`], but give up `grace` after `cancel`
    /// fires if tables are still running.
    ///
    /// An abandoned run returns [`MigrateError::Cancelled`]. Both connections
    /// are closed exactly once on every path.
    pub async fn run_with_shutdown_timeout(
        self,
        cancel: CancellationToken,
        dry_run: bool,
        grace: Duration,
    ) -> Result<MigrationResult> {
        let pools = self.pools.clone();
        let deadline = {
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            }
        };

        tokio::select! {
            result = self.run(cancel, dry_run) => result,
            _ = deadline => {
                warn!(
                    "Tables still running {}s after shutdown was requested, abandoning run",
                    grace.as_secs()
                );
                pools.close().await;
                Err(MigrateError::Cancelled)
            }
        }
    }

    async fn execute(&self, cancel: CancellationToken, dry_run: bool) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mode = self.config.mode();

        info!("Starting migration run: {}", run_id);

        // Phase 1: decide which tables this run covers
        let tables = self.plan_tables(&mode).await?;
        info!("Found {} tables to migrate", tables.len());

        if dry_run {
            let plan = self.dry_run_plan(tables).await;
            return Ok(self.build_result(run_id, &mode, started_at, start, Vec::new(), plan, true));
        }

        // Phase 2: make sure the target database is there
        self.pools
            .target
            .ensure_database()
            .await
            .map_err(|e| MigrateError::connection(e, "ensuring target database"))?;

        // Phase 3: create every destination collection
        self.prepare_collections(&tables).await?;

        // Phase 4: copy tables
        info!(
            "Transferring {} tables (concurrency: {}, chunk size: {})",
            tables.len(),
            self.config.migration.concurrency_limit,
            self.config.migration.chunk_size
        );
        let outcomes = self.migrate_tables(tables, cancel).await;

        Ok(self.build_result(
            run_id,
            &mode,
            started_at,
            start,
            outcomes,
            Vec::new(),
            false,
        ))
    }

    /// Tables covered by this run. Listing failures are fatal.
    async fn plan_tables(&self, mode: &MigrationMode) -> Result<Vec<TableSpec>> {
        match mode {
            MigrationMode::SingleTable(spec) => Ok(vec![spec.clone()]),
            MigrationMode::Bulk => {
                let filter = TableFilter::new(
                    &self.config.migration.include_tables,
                    &self.config.migration.exclude_tables,
                )?;
                let all = self
                    .pools
                    .source
                    .list_tables()
                    .await
                    .map_err(|e| MigrateError::connection(e, "listing source tables"))?;
                let total = all.len();
                let selected = filter.apply(all);
                if selected.len() < total {
                    debug!(
                        "Table filters selected {} of {} tables",
                        selected.len(),
                        total
                    );
                }
                Ok(selected.into_iter().map(TableSpec::mirrored).collect())
            }
        }
    }

    /// Create (and with `drop_existing`, first drop) each destination
    /// collection. Any failure is fatal to the run.
    async fn prepare_collections(&self, tables: &[TableSpec]) -> Result<()> {
        let writer = ChunkWriter::new(
            self.pools.target.clone(),
            self.config.migration.operation_timeout(),
        );
        let drop_existing = self.config.migration.drop_existing;

        stream::iter(tables)
            .map(|table| {
                let writer = writer.clone();
                async move {
                    writer
                        .prepare(&table.dest, drop_existing)
                        .await
                        .map_err(|e| MigrateError::connection(e, "creating target collection"))
                }
            })
            .buffer_unordered(self.config.migration.concurrency_limit)
            .try_collect::<Vec<()>>()
            .await?;

        debug!("Prepared {} target collections", tables.len());
        Ok(())
    }

    async fn dry_run_plan(&self, tables: Vec<TableSpec>) -> Vec<PlannedTable> {
        let source = self.pools.source.clone();
        let plan: Vec<PlannedTable> = stream::iter(tables)
            .map(|table| {
                let source = source.clone();
                async move {
                    let source_rows = match source.count_rows(&table.source).await {
                        Ok(n) => n,
                        Err(e) => {
                            warn!("{}: could not count rows: {}", table, e);
                            -1
                        }
                    };
                    PlannedTable { table, source_rows }
                }
            })
            .buffered(self.config.migration.concurrency_limit)
            .collect()
            .await;

        for planned in &plan {
            info!("Would migrate {} ({} rows)", planned.table, planned.source_rows);
        }
        plan
    }

    /// Run one migrator per table, at most `concurrency_limit` at a time.
    ///
    /// Each task holds its permit from INIT through VALIDATING. Outcomes are
    /// reported as tasks finish, so a slow table never hides a failed one.
    async fn migrate_tables(
        &self,
        tables: Vec<TableSpec>,
        cancel: CancellationToken,
    ) -> Vec<MigrationOutcome> {
        let total = tables.len();
        let semaphore = Arc::new(Semaphore::new(self.config.migration.concurrency_limit));
        let progress = Arc::new(
            ProgressReporter::new(total, self.config.migration.silent)
                .with_json_lines(self.progress),
        );
        let transfer = TransferConfig {
            create_collections: false,
            ..TransferConfig::from(&self.config.migration)
        };
        let migrator = Arc::new(TableMigrator::new(
            self.pools.source.clone(),
            self.pools.target.clone(),
            transfer,
            progress.clone(),
            cancel,
        ));

        let mut running = FuturesUnordered::new();
        for table in tables {
            let semaphore = semaphore.clone();
            let migrator = migrator.clone();
            let task_table = table.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return MigrationOutcome::failed(
                            task_table,
                            ErrorKind::Cancelled,
                            "worker pool closed",
                        )
                    }
                };
                migrator.run(task_table).await
            });

            running.push(async move { (table, handle.await) });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some((table, joined)) = running.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{}: task panicked - {}", table, e);
                    MigrationOutcome::failed(
                        table,
                        ErrorKind::Internal,
                        format!("Task panicked: {}", e),
                    )
                }
            };

            progress.table_finished(&outcome.table, outcome.status.as_str());
            if !outcome.is_done() {
                error!("{}", outcome.summary_line());
            } else if outcome.is_mismatch() {
                warn!("{}", outcome.summary_line());
            } else {
                info!("{}", outcome.summary_line());
            }

            outcomes.push(outcome);
        }

        outcomes
    }

    #[allow(clippy::too_many_arguments)]
    fn build_result(
        &self,
        run_id: String,
        mode: &MigrationMode,
        started_at: DateTime<Utc>,
        start: Instant,
        outcomes: Vec<MigrationOutcome>,
        plan: Vec<PlannedTable>,
        dry_run: bool,
    ) -> MigrationResult {
        let duration_seconds = start.elapsed().as_secs_f64();
        let cancelled = outcomes.iter().any(|o| {
            o.error
                .as_ref()
                .is_some_and(|e| e.kind == ErrorKind::Cancelled)
        });

        let tables_success = outcomes.iter().filter(|o| o.is_done()).count();
        let tables_failed = outcomes.len() - tables_success;
        let validation_mismatches = outcomes.iter().filter(|o| o.is_mismatch()).count();
        let rows_migrated: u64 = outcomes.iter().map(|o| o.rows_migrated).sum();
        let failed_tables = outcomes
            .iter()
            .filter(|o| !o.is_done())
            .map(|o| o.table.to_string())
            .collect();

        let rows_per_second = if duration_seconds > 0.0 {
            (rows_migrated as f64 / duration_seconds) as u64
        } else {
            0
        };

        let status = if dry_run {
            RunStatus::DryRun
        } else if cancelled {
            RunStatus::Cancelled
        } else if tables_failed > 0 {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        };

        let result = MigrationResult {
            run_id,
            mode: match mode {
                MigrationMode::Bulk => "bulk",
                MigrationMode::SingleTable(_) => "single_table",
            }
            .to_string(),
            status,
            started_at,
            completed_at: Utc::now(),
            duration_seconds,
            tables_total: outcomes.len().max(plan.len()),
            tables_success,
            tables_failed,
            validation_mismatches,
            rows_migrated,
            rows_per_second,
            failed_tables,
            outcomes,
            plan,
        };

        info!(
            "Run {} finished: {:?}, {}/{} tables, {} rows in {:.2}s",
            result.run_id,
            result.status,
            result.tables_success,
            result.tables_total,
            result.rows_migrated,
            result.duration_seconds
        );

        result
    }

    /// Compare row counts for every planned table without migrating.
    pub async fn validate(self) -> Result<Vec<ValidationResult>> {
        let result = self.validate_tables().await;
        self.pools.close().await;
        result
    }

    async fn validate_tables(&self) -> Result<Vec<ValidationResult>> {
        let mode = self.config.mode();
        let tables = self.plan_tables(&mode).await?;
        let validator = Validator::new(
            self.pools.source.clone(),
            self.pools.target.clone(),
            self.config.migration.operation_timeout(),
        );

        info!("Validating {} tables", tables.len());
        let results: Vec<ValidationResult> = stream::iter(tables)
            .map(|table| {
                let validator = validator.clone();
                async move { validator.compare(&table).await }
            })
            .buffer_unordered(self.config.migration.concurrency_limit)
            .collect()
            .await;

        Ok(results)
    }

    /// Tables a run with the current configuration would migrate.
    pub async fn list_tables(self) -> Result<Vec<TableSpec>> {
        let mode = self.config.mode();
        let result = self.plan_tables(&mode).await;
        self.pools.close().await;
        result
    }

    /// Ping both sides and measure latency.
    pub async fn health_check(self) -> Result<HealthCheckResult> {
        let source = self.pools.source.clone();
        let target = self.pools.target.clone();

        let ((source_result, source_latency_ms), (target_result, target_latency_ms)) = tokio::join!(
            timed(source.test_connection()),
            timed(target.test_connection())
        );

        self.pools.close().await;

        let source_error = source_result.err().map(|e| e.to_string());
        let target_error = target_result.err().map(|e| e.to_string());

        Ok(HealthCheckResult {
            healthy: source_error.is_none() && target_error.is_none(),
            source_connected: source_error.is_none(),
            source_latency_ms,
            source_error,
            target_connected: target_error.is_none(),
            target_latency_ms,
            target_error,
        })
    }
}

async fn timed(fut: impl Future<Output = Result<()>>) -> (Result<()>, u64) {
    let start = Instant::now();
    let outcome = fut.await;
    (outcome, start.elapsed().as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(mode: &str, status: RunStatus) -> MigrationResult {
        MigrationResult {
            run_id: "r".to_string(),
            mode: mode.to_string(),
            status,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 1.0,
            tables_total: 3,
            tables_success: 2,
            tables_failed: 1,
            validation_mismatches: 0,
            rows_migrated: 10,
            rows_per_second: 10,
            failed_tables: vec!["orders".to_string()],
            outcomes: Vec::new(),
            plan: Vec::new(),
        }
    }

    #[test]
    fn test_bulk_failures_exit_zero_unless_strict() {
        let r = result("bulk", RunStatus::CompletedWithFailures);
        assert_eq!(r.exit_code(false), 0);
        assert_eq!(r.exit_code(true), 1);
    }

    #[test]
    fn test_single_table_failure_exits_non_zero() {
        let r = result("single_table", RunStatus::CompletedWithFailures);
        assert_eq!(r.exit_code(false), 1);
    }

    #[test]
    fn test_cancelled_exit_code() {
        assert_eq!(result("bulk", RunStatus::Cancelled).exit_code(false), 130);
        assert_eq!(result("bulk", RunStatus::Completed).exit_code(true), 0);
    }

    #[test]
    fn test_result_json() {
        let json = result("bulk", RunStatus::CompletedWithFailures)
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "completed_with_failures");
        assert_eq!(value["failed_tables"][0], "orders");
        assert!(value.get("plan").is_none());
    }
}
