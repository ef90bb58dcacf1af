//! # Health Sync CLI (`hsync`)
//!
//! Reads samples from a local health export, normalizes them, and uploads
//! them to the configured ingestion endpoint.
//!
//! ## Usage
//!
//! ```bash
//! hsync --config ./config/hsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hsync types` | List tracked data types and their canonical units |
//! | `hsync authorize` | Fetch an upload token and request read permission |
//! | `hsync sync` | Authorize, fetch the window, and upload it in batches |
//!
//! ## Examples
//!
//! ```bash
//! # Upload the default lookback window (30 days)
//! hsync sync --config ./config/hsync.toml
//!
//! # Upload an explicit date range, print the result as JSON
//! hsync sync --since 2024-05-01 --until 2024-05-31 --json
//!
//! # See what would be uploaded
//! hsync sync --days 7 --dry-run
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use health_sync::config::{self, Config};
use health_sync::convert::{WORKOUT_DATA_TYPE, WORKOUT_UNIT};
use health_sync::coordinator::SyncCoordinator;
use health_sync::credential::{CredentialSource, StaticCredential, TokenServiceClient};
use health_sync::fetch::FetchOrchestrator;
use health_sync::logging;
use health_sync::metrics::MetricType;
use health_sync::progress::{self, format_number, ProgressMode};
use health_sync::store::{DateWindow, HealthStore, LocalExportStore};
use health_sync::upload::batch_count;

/// Health Sync CLI: upload on-device health metrics in batches.
#[derive(Parser)]
#[command(
    name = "hsync",
    about = "Health Sync: upload on-device health metrics to an ingestion API",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hsync.toml")]
    config: PathBuf,

    /// Status output on stderr. Defaults to `human` on a TTY, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tracked data types and their canonical units.
    Types,

    /// Fetch an upload token and request read permission.
    Authorize,

    /// Fetch samples in a date window and upload them.
    ///
    /// Without `--since`, the window is the last `--days` days (or
    /// `[sync].lookback_days`) ending now.
    Sync {
        /// First day to include (YYYY-MM-DD, UTC).
        #[arg(long)]
        since: Option<String>,

        /// Last day to include (YYYY-MM-DD, UTC).
        #[arg(long)]
        until: Option<String>,

        /// Number of days to look back when `--since` is not given.
        #[arg(long)]
        days: Option<u32>,

        /// Fetch and count only; nothing is uploaded.
        #[arg(long)]
        dry_run: bool,

        /// Print the sync result as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Types = cli.command {
        print_types();
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    let store: Arc<dyn HealthStore> = Arc::new(LocalExportStore::load(&cfg.store.export_path)?);
    let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Types => {}
        Commands::Authorize => {
            let coordinator = build_coordinator(&cfg, store)?;
            let follower = progress::follow(coordinator.subscribe(), mode.reporter());
            let outcome = coordinator.setup().await;
            drop(coordinator);
            let _ = follower.await;
            outcome?;
            println!("authorize");
            println!("ok");
        }
        Commands::Sync {
            since,
            until,
            days,
            dry_run,
            json,
        } => {
            let window = resolve_window(
                since.as_deref(),
                until.as_deref(),
                days.unwrap_or(cfg.sync.lookback_days),
                Utc::now(),
            )?;

            if dry_run {
                return run_dry_run(&cfg, store, window).await;
            }

            let coordinator = build_coordinator(&cfg, store)?;
            let follower = progress::follow(coordinator.subscribe(), mode.reporter());
            let outcome = async {
                coordinator.setup().await?;
                coordinator.sync(window).await
            }
            .await;
            drop(coordinator);
            let _ = follower.await;
            let result = outcome?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("sync");
                println!("  records: {}", format_number(result.total_records as u64));
                println!(
                    "  batches: {}/{}",
                    result.successful_batches, result.total_batches
                );
                if result.failed_batches > 0 {
                    println!("  failed batches: {}", result.failed_batches);
                }
                println!("ok");
            }
        }
    }

    Ok(())
}

fn build_coordinator(cfg: &Config, store: Arc<dyn HealthStore>) -> Result<SyncCoordinator> {
    let credentials = build_credentials(cfg)?;
    Ok(SyncCoordinator::new(cfg.sync_settings(), store, credentials)?)
}

fn build_credentials(cfg: &Config) -> Result<Arc<dyn CredentialSource>> {
    if let Some(token) = &cfg.credential.static_token {
        return Ok(Arc::new(StaticCredential::new(token.clone())));
    }
    let token_url = cfg
        .credential
        .token_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("credential.token_url is not configured"))?;
    let client = TokenServiceClient::new(
        token_url,
        cfg.credential.resolve_app_token(),
        cfg.credential.expires_in_hours,
        std::time::Duration::from_secs(cfg.upload.timeout_secs),
    )?;
    Ok(Arc::new(client))
}

async fn run_dry_run(cfg: &Config, store: Arc<dyn HealthStore>, window: DateWindow) -> Result<()> {
    let points = FetchOrchestrator::new(store).fetch(window).await?;

    let mut per_type: BTreeMap<&str, u64> = BTreeMap::new();
    for point in &points {
        *per_type.entry(point.data_type.as_str()).or_default() += 1;
    }

    println!("sync (dry-run)");
    println!(
        "  window: {} .. {}",
        window.start().to_rfc3339(),
        window.end().to_rfc3339()
    );
    for (data_type, n) in &per_type {
        println!("  {}: {}", data_type, format_number(*n));
    }
    println!("  total records: {}", format_number(points.len() as u64));
    println!(
        "  batches: {}",
        batch_count(points.len(), cfg.upload.batch_size)
    );
    Ok(())
}

fn print_types() {
    for metric in MetricType::QUANTITY.iter().chain(MetricType::CATEGORY.iter()) {
        let unit = metric.canonical_unit().map(|u| u.as_str()).unwrap_or("-");
        println!("{:<24} {}", metric.tag(), unit);
    }
    println!("{:<24} {}", WORKOUT_DATA_TYPE, WORKOUT_UNIT);
}

fn parse_day(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

/// `--since`/`--until` are whole UTC days; `--until` is inclusive.
fn resolve_window(
    since: Option<&str>,
    until: Option<&str>,
    days: u32,
    now: DateTime<Utc>,
) -> Result<DateWindow> {
    let end = match until {
        Some(day) => parse_day(day)? + Duration::days(1),
        None => now,
    };
    let window = match since {
        Some(day) => DateWindow::new(parse_day(day)?, end)?,
        None => DateWindow::last_days(end, days)?,
    };
    Ok(window)
}
