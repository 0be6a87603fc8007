//! Marketboard Sync
//!
//! Pulls Universalis sale history for whitelisted items into SQLite, either
//! once or on a fixed interval.
//!
//! Usage:
//!   marketboard-sync --whitelist whitelist.ini --db-path marketboard_data.sqlite
//!   marketboard-sync --interval-secs 900 --port 8080
//!
//! Every flag can also be set through the environment variable named in
//! `--help`; a `.env` file is loaded first.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketboard_sync::{
    api::{status_router, SharedSyncStatus},
    scrapers::universalis::{UniversalisClient, UNIVERSALIS_API_BASE},
    whitelist::load_tracked_items,
    SaleStore, SyncOptions, SyncOrchestrator, SyncReport, TrackedItemSet,
};

#[derive(Parser, Debug)]
#[command(name = "marketboard-sync")]
#[command(about = "Synchronize Universalis sale history for tracked items into SQLite")]
struct Args {
    /// SQLite database file
    #[arg(long, env = "MARKETBOARD_DB_PATH", default_value = "marketboard_data.sqlite")]
    db_path: PathBuf,

    /// Tracked item list, one id per line
    #[arg(long, env = "WHITELIST_PATH", default_value = "whitelist.ini")]
    whitelist: PathBuf,

    /// Region, data center or world to query (europe, light, lich, ...)
    #[arg(long, env = "UNIVERSALIS_REGION", default_value = "europe")]
    region: String,

    #[arg(long, env = "UNIVERSALIS_BASE_URL", default_value = UNIVERSALIS_API_BASE)]
    base_url: String,

    /// HTTP request timeout
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Repeat the sync on this interval instead of running once
    #[arg(long, env = "SYNC_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Serve /health and /api/sync/status on this port (interval mode only)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Keep ingesting other items when one item's history fails
    #[arg(long, env = "SYNC_ISOLATE_FAILURES")]
    isolate_failures: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    let args = Args::parse();
    init_tracing();

    let tracked = load_tracked_items(&args.whitelist)?;
    if tracked.is_empty() {
        warn!(path = %args.whitelist.display(), "Whitelist has no items, nothing will be synced");
    }
    info!(
        items = tracked.len(),
        path = %args.whitelist.display(),
        "📋 Loaded tracked items"
    );

    let store = SaleStore::open(&args.db_path)?;
    let client = UniversalisClient::new(
        args.base_url.as_str(),
        Duration::from_secs(args.timeout_secs),
    )?;
    let orchestrator = SyncOrchestrator::new(
        Arc::new(client),
        store,
        SyncOptions {
            region: args.region.clone(),
            isolate_failures: args.isolate_failures,
        },
    );

    let status = SharedSyncStatus::default();
    if let Some(port) = status_port(&args) {
        let status = status.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_status(port, status).await {
                error!("Status server stopped: {e:#}");
            }
        });
    }

    match args.interval_secs {
        None => {
            run_once(&orchestrator, &tracked, &status).await?;
        }
        Some(secs) => {
            sync_polling(&orchestrator, &tracked, &status, Duration::from_secs(secs.max(1))).await;
        }
    }

    Ok(())
}

/// The status server only outlives a single run in interval mode.
fn status_port(args: &Args) -> Option<u16> {
    match (args.port, args.interval_secs) {
        (Some(port), Some(_)) => Some(port),
        (Some(port), None) => {
            warn!(port, "--port ignored without --interval-secs; a single sync exits when done");
            None
        }
        (None, _) => None,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketboard_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

async fn run_once(
    orchestrator: &SyncOrchestrator,
    tracked: &TrackedItemSet,
    status: &SharedSyncStatus,
) -> Result<SyncReport> {
    match orchestrator.run(tracked).await {
        Ok(report) => {
            if report.is_partial() {
                warn!(
                    failed = report.failed_items.len(),
                    "Sync finished with skipped items"
                );
            }
            status.write().record_success(report.clone());
            Ok(report)
        }
        Err(e) => {
            error!(phase = %e.phase(), "❌ Sync failed: {e}");
            status.write().record_failure(&e);
            Err(e).context("market board sync failed")
        }
    }
}

/// Run syncs back to back on a fixed interval until Ctrl-C. A run that
/// overruns the interval delays the next tick rather than overlapping it.
async fn sync_polling(
    orchestrator: &SyncOrchestrator,
    tracked: &TrackedItemSet,
    status: &SharedSyncStatus,
    every: Duration,
) {
    info!(interval_secs = every.as_secs(), "⏱️ Sync polling started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are logged and recorded in status; keep polling.
                let _ = run_once(orchestrator, tracked, status).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping sync polling");
                break;
            }
        }
    }
}

async fn serve_status(port: u16, status: SharedSyncStatus) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind status server on {}", addr))?;
    info!("🎯 Status server listening on {}", addr);

    axum::serve(listener, status_router(status))
        .await
        .context("Status server error")
}
