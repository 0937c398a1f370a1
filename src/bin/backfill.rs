//! On-demand backfill tool: `backfill <identity> [--limit N] [--workers N]`.
//! Traverses the identity's full activity history and archives each entry,
//! printing a final success/failure tally.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dealwatch::config::{BackfillCfg, MonitorCfg};
use dealwatch::extract::HttpExtractor;
use dealwatch::session::{browser::BrowserSessionFactory, SessionFactory};
use dealwatch::store::MemoryStore;

fn parse_args() -> Result<(String, BackfillCfg)> {
    let mut cfg = BackfillCfg::from_env();
    let mut identity = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--limit" => {
                cfg.limit = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| anyhow!("--limit needs a number"))?;
            }
            "--workers" => {
                cfg.workers = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .filter(|&w: &usize| w > 0)
                    .ok_or_else(|| anyhow!("--workers needs a positive number"))?;
            }
            other if identity.is_none() && !other.starts_with('-') => {
                identity = Some(other.to_string());
            }
            other => return Err(anyhow!("unexpected argument: {other}")),
        }
    }

    let identity =
        identity.ok_or_else(|| anyhow!("usage: backfill <identity> [--limit N] [--workers N]"))?;
    Ok((identity, cfg))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dealwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
    dealwatch::describe_metrics();

    let (identity, cfg) = parse_args()?;
    let monitor_cfg = MonitorCfg::from_env();
    if cfg.workers > 20 {
        warn!(workers = cfg.workers, "high worker count risks rate limiting");
    }

    let store = Arc::new(MemoryStore::new());
    let extractor = Arc::new(
        HttpExtractor::new(&monitor_cfg.extractor_url).context("building extractor client")?,
    );
    let factory = BrowserSessionFactory::new(&monitor_cfg.browser_service_url, &monitor_cfg.feed_url)
        .context("building browser session factory")?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let ctrlc_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, draining backfill");
            let _ = ctrlc_tx.send(());
        }
    });

    let session = factory
        .acquire()
        .await
        .context("acquiring observation session")?;
    let report =
        dealwatch::fetch_activity(session, extractor, store, &identity, &cfg, shutdown_tx)
            .await
            .with_context(|| format!("backfill for {identity}"))?;

    println!(
        "Backfill for {identity}: {} discovered, {} archived, {} skipped on errors",
        report.attempted, report.archived, report.failed
    );
    Ok(())
}
