//! mysql-mongo-migrate CLI - chunked MySQL to MongoDB migration.

use clap::{Parser, Subcommand};
use mysql_mongo_migrate::{Config, MigrateError, MigrationResult, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-mongo-migrate")]
#[command(about = "Chunked MySQL to MongoDB migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Suppress progress output (per-chunk and per-table progress lines)
    #[arg(long)]
    silent: bool,

    /// Seconds to wait for running tables after Ctrl-C/SIGTERM (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new migration
    Run {
        /// Migrate only this source table
        #[arg(long)]
        source_table: Option<String>,

        /// Destination collection for --source-table (default: same name)
        #[arg(long)]
        dest_table: Option<String>,

        /// Override maximum number of tables migrated at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override rows per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Dry run: list planned tables and row counts without writing
        #[arg(long)]
        dry_run: bool,

        /// Order range scans by primary key
        #[arg(long)]
        stable_order: bool,

        /// Drop each destination collection before copying into it
        #[arg(long)]
        drop_existing: bool,

        /// Exit non-zero when any table fails
        #[arg(long)]
        strict: bool,
    },

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,

    /// List the tables a run would migrate
    ListTables,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, MigrateError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    let mut config = Config::load(&cli.config)?;
    if cli.silent {
        config.migration.silent = true;
    }
    info!("Loaded configuration from {:?}", cli.config);

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Run {
            source_table,
            dest_table,
            concurrency,
            chunk_size,
            dry_run,
            stable_order,
            drop_existing,
            strict,
        } => {
            // Apply overrides
            if let Some(table) = source_table {
                config.source.table = Some(table);
            }
            if let Some(table) = dest_table {
                config.target.table = Some(table);
            }
            if let Some(n) = concurrency {
                config.migration.concurrency_limit = n;
            }
            if let Some(n) = chunk_size {
                config.migration.chunk_size = n;
            }
            config.migration.stable_order |= stable_order;
            config.migration.drop_existing |= drop_existing;
            config.migration.strict |= strict;
            config.validate()?;

            let strict = config.migration.strict;
            let orchestrator = Orchestrator::new(config)
                .await?
                .with_progress(cli.progress);

            let result = orchestrator
                .run_with_shutdown_timeout(
                    cancel_token,
                    dry_run,
                    Duration::from_secs(cli.shutdown_timeout),
                )
                .await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_summary(&result, dry_run);
            }

            Ok(result.exit_code(strict))
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let results = orchestrator.validate().await?;
            let mismatches = results.iter().filter(|r| !r.ok).count();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("Validation Results:");
                for r in &results {
                    let status = match (&r.error, r.ok) {
                        (Some(_), _) => "ERROR",
                        (None, true) => "match",
                        (None, false) => "MISMATCH",
                    };
                    println!(
                        "  {}: source={} target={} ({})",
                        r.table, r.source_count, r.dest_count, status
                    );
                }
                println!("\n  {} tables, {} mismatches", results.len(), mismatches);
            }

            Ok(if mismatches > 0 { 1 } else { 0 })
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (MongoDB): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    "one or both databases did not respond",
                    "health check",
                ));
            }
            Ok(0)
        }

        Commands::ListTables => {
            let orchestrator = Orchestrator::new(config).await?;
            let tables = orchestrator.list_tables().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for table in &tables {
                    println!("{}", table);
                }
            }
            Ok(0)
        }
    }
}

fn print_summary(result: &MigrationResult, dry_run: bool) {
    if dry_run {
        println!("\nDry run completed!");
        for planned in &result.plan {
            println!("  {} ({} rows)", planned.table, planned.source_rows);
        }
        println!("  Tables: {}", result.tables_total);
        return;
    }

    println!("\nMigration completed!");
    println!("  Run ID: {}", result.run_id);
    println!("  Status: {:?}", result.status);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Tables: {}/{}",
        result.tables_success, result.tables_total
    );
    println!("  Rows: {}", result.rows_migrated);
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    if result.validation_mismatches > 0 {
        println!("  Validation mismatches: {}", result.validation_mismatches);
    }
    if !result.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", result.failed_tables);
    }
}

fn log_level(verbosity: &str) -> Level {
    match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level(verbosity))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| format!("Failed to install logger: {}", e))
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM (container shutdown).
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Finishing current chunks...", name);
                    token.cancel();
                }
                Err(e) => warn!("Failed to setup {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Finishing current chunks...");
                token.cancel();
            }
            Err(e) => warn!("Failed to setup Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}
