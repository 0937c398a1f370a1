//! Live monitor entrypoint: session supervisor + feed poller, trend detector,
//! and watchlist reload, all torn down together on Ctrl-C.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dealwatch::config::{load_watchlist_default, MonitorCfg};
use dealwatch::extract::HttpExtractor;
use dealwatch::notify::{telegram::TelegramNotifier, LogNotifier, Notifier};
use dealwatch::poller::Poller;
use dealwatch::session::{
    browser::{origin_of, BrowserSessionFactory},
    run_supervised,
};
use dealwatch::store::{MemoryStore, SnapshotStore};
use dealwatch::trend::TrendDetector;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dealwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    dealwatch::describe_metrics();

    let cfg = MonitorCfg::from_env();
    info!(?cfg, "starting live monitor");

    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
    match load_watchlist_default() {
        Ok(tags) => {
            info!(count = tags.len(), "watchlist loaded");
            store.set_watched_tags(tags);
        }
        Err(e) => warn!(error = %e, "watchlist load failed, starting with empty watchlist"),
    }
    let retention_cutoff =
        Utc::now() - ChronoDuration::hours(cfg.snapshot_retention_hours as i64);
    let pruned = store.prune_snapshots_older_than(retention_cutoff);
    if pruned > 0 {
        info!(pruned, "pruned old snapshots");
    }

    let notifier: Arc<dyn Notifier> = match TelegramNotifier::from_env() {
        Some(n) => Arc::new(n),
        None => {
            warn!("TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set, alerts go to the log only");
            Arc::new(LogNotifier)
        }
    };
    let extractor = Arc::new(
        HttpExtractor::new(&cfg.extractor_url).context("building extractor client")?,
    );
    let factory = Arc::new(
        BrowserSessionFactory::new(&cfg.browser_service_url, &cfg.feed_url)
            .context("building browser session factory")?,
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Watchlist reload: the operator edits the file, the engine only reads.
    let reload_store = Arc::clone(&store);
    let reload_every = cfg.watchlist_reload;
    let mut reload_shutdown = shutdown_tx.subscribe();
    let reload_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(reload_every) => {
                    match load_watchlist_default() {
                        Ok(tags) => reload_store.set_watched_tags(tags),
                        Err(e) => warn!(error = %e, "watchlist reload failed"),
                    }
                }
                _ = reload_shutdown.recv() => return,
            }
        }
    });

    let detector = TrendDetector::new(Arc::clone(&store), Arc::clone(&notifier), cfg.min_heat_score);
    let trend_shutdown = shutdown_tx.subscribe();
    let trend_interval = cfg.trend_check_interval;
    let trend_task = tokio::spawn(async move {
        detector.run(trend_interval, trend_shutdown).await;
    });

    let poller = Arc::new(Poller::new(
        Arc::clone(&store),
        extractor,
        Arc::clone(&notifier),
        cfg.poll_interval,
        &origin_of(&cfg.feed_url),
    ));
    let monitor_shutdown = shutdown_tx.clone();
    let monitor_task = tokio::spawn(async move {
        run_supervised(
            factory.as_ref(),
            cfg.session_cooldown,
            monitor_shutdown,
            |session, shutdown| {
                let poller = Arc::clone(&poller);
                async move { poller.run(session, shutdown).await }
            },
        )
        .await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(());

    let _ = monitor_task.await;
    let _ = trend_task.await;
    let _ = reload_task.await;
    info!("monitor stopped");
    Ok(())
}
