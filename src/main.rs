//! Solvency Ledger Service
//!
//! Serves the ledger over HTTP. State lives in memory; when an export path
//! is configured the ledger is restored from it at startup and written back
//! on shutdown.
//!
//! Usage:
//!   solvency-ledger --owner 0x... --bind-addr 127.0.0.1:8080
//!
//! Environment:
//!   SOLVENCY_CONFIG_PATH - TOML config file (default: solvency.toml)
//!   SOLVENCY_OWNER, SOLVENCY_BIND_ADDR, SOLVENCY_EXPORT_PATH,
//!   SOLVENCY_HISTORY_MAX_ENTRIES, SOLVENCY_HISTORY_MIN_INTERVAL_SECS
//!   RUST_LOG - tracing filter

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solvency_ledger::api::create_router;
use solvency_ledger::clock::{format_timestamp, Clock, SystemClock};
use solvency_ledger::config::{AppConfig, DEFAULT_CONFIG_PATH};
use solvency_ledger::{LedgerExport, Principal, SolvencyLedger};

#[derive(Parser, Debug)]
#[command(name = "solvency-ledger")]
#[command(about = "Solvency ledger and historical tracking service")]
struct Args {
    /// TOML config file
    #[arg(long, env = "SOLVENCY_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Listen address, overrides [server].bind_addr
    #[arg(long)]
    bind_addr: Option<String>,

    /// Ledger owner, overrides [ledger].owner
    #[arg(long)]
    owner: Option<Principal>,

    /// Export file, overrides [server].export_path
    #[arg(long)]
    export_path: Option<PathBuf>,

    /// Start empty even if the export file exists
    #[arg(long)]
    no_restore: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::load_layered(&args.config)?;
    if let Some(addr) = args.bind_addr {
        config.server.bind_addr = addr;
    }
    if let Some(owner) = args.owner {
        config.ledger.owner = Some(owner);
    }
    if let Some(path) = args.export_path {
        config.server.export_path = Some(path);
    }
    config.validate()?;

    info!("🚀 Solvency ledger starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(build_ledger(&config, clock, args.no_restore)?);

    let owner = ledger.owner();
    for oracle in &config.ledger.oracles {
        ledger
            .set_oracle(&owner, *oracle, true)
            .context("Failed to grant configured oracle")?;
    }
    info!(owner = %owner, sources = ledger.sources().len(), "🔐 Access guard ready");

    let app = create_router(ledger.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(path) = &config.server.export_path {
        let export = ledger.export();
        export.save(path)?;
        info!(
            path = %path.display(),
            history_entries = export.history.len(),
            exported_at = %format_timestamp(export.exported_at),
            "Ledger exported"
        );
    }

    info!("Solvency ledger stopped");
    Ok(())
}

fn build_ledger(config: &AppConfig, clock: Arc<dyn Clock>, no_restore: bool) -> Result<SolvencyLedger> {
    if let Some(path) = config.server.export_path.as_deref() {
        if path.exists() && !no_restore {
            let export = LedgerExport::load(path)?;
            if let Some(owner) = config.ledger.owner {
                if owner != export.owner {
                    warn!(
                        configured = %owner,
                        exported = %export.owner,
                        "Configured owner differs from export; keeping exported owner"
                    );
                }
            }
            let ledger = SolvencyLedger::restore_with(export, config.history, config.alerts, clock)
                .with_context(|| format!("Failed to restore ledger from {}", path.display()))?;
            return Ok(ledger);
        }
    }

    let ledger = SolvencyLedger::new(config.ledger_config()?, clock)?;
    Ok(ledger)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate root .env when running from elsewhere
    let candidate = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solvency_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
