// src/backfill.rs
//! On-demand backfill of one identity's historical activity. A single
//! traversal drives infinite scroll on the owned session and feeds stubs
//! through a bounded channel into a fixed pool of enrichment workers; the
//! pool size is the only backpressure mechanism against the rate-limited
//! source and must bound the number of in-flight extraction requests.

use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BackfillCfg;
use crate::error::TraversalError;
use crate::extract::Extractor;
use crate::feed;
use crate::session::FeedSession;
use crate::store::SnapshotStore;
use crate::types::{ActivityRecord, ActivityRole, ActivityStub, Item, ItemSource};

/// Final tally of one pipeline invocation. `attempted` counts stubs handed to
/// the pool; `archived + failed == attempted` once the pool has drained.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillReport {
    pub attempted: usize,
    pub archived: usize,
    pub failed: usize,
}

/// Traverse `identity`'s activity and enrich each entry concurrently.
///
/// Fails with `TraversalError` only when the activity page cannot be loaded
/// at all; mid-stream session trouble ends the traversal early but the batch
/// still drains and reports. Per-item enrichment failures are logged and
/// counted, never fatal. Output ordering is not guaranteed; stub `position`
/// preserves the site-native traversal order for callers that need it.
pub async fn fetch_activity(
    mut session: Box<dyn FeedSession>,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn SnapshotStore>,
    identity: &str,
    cfg: &BackfillCfg,
    shutdown: broadcast::Sender<()>,
) -> Result<BackfillReport, TraversalError> {
    session.begin_activity(identity).await?;
    info!(identity, limit = cfg.limit, workers = cfg.workers, "backfill started");

    // Bounded queue between the single producer and the pool; capacity equal
    // to the pool size keeps at most one "wave" of work buffered.
    let (tx, rx) = mpsc::channel::<ActivityStub>(cfg.workers);
    let rx = Arc::new(Mutex::new(rx));

    let workers: Vec<JoinHandle<(usize, usize)>> = (0..cfg.workers)
        .map(|worker_id| {
            let rx = Arc::clone(&rx);
            let extractor = Arc::clone(&extractor);
            let store = Arc::clone(&store);
            let identity = identity.to_string();
            tokio::spawn(async move {
                let mut archived = 0usize;
                let mut failed = 0usize;
                loop {
                    // Lock only for the pull so siblings are never blocked
                    // while this worker is enriching.
                    let stub = { rx.lock().await.recv().await };
                    let Some(stub) = stub else { break };
                    match enrich_one(&*extractor, &*store, &identity, &stub).await {
                        Ok(()) => {
                            archived += 1;
                            counter!("backfill_archived_total").increment(1);
                        }
                        Err(e) => {
                            failed += 1;
                            counter!("backfill_failed_total").increment(1);
                            warn!(worker_id, url = %stub.url, error = %e, "enrichment failed, skipping");
                        }
                    }
                }
                (archived, failed)
            })
        })
        .collect();

    let mut shutdown_rx = shutdown.subscribe();
    let mut attempted = 0usize;
    'traversal: while attempted < cfg.limit {
        let page = match session.next_activity_page().await {
            Ok(Some(page)) => page,
            Ok(None) => {
                debug!(identity, "traversal exhausted");
                break;
            }
            Err(e) => {
                // The pipeline already started; surface this as an early end
                // of traversal, not a terminal failure.
                warn!(identity, error = %e, "traversal ended early on session error");
                break;
            }
        };
        for stub in page {
            if attempted >= cfg.limit {
                break 'traversal;
            }
            attempted += 1;
            counter!("backfill_stubs_total").increment(1);
            if tx.send(stub).await.is_err() {
                break 'traversal;
            }
        }
        if attempted % 10 == 0 && attempted > 0 {
            debug!(identity, attempted, "backfill discovery progress");
        }
        // Human pacing between scroll pulls; bail out promptly on shutdown.
        if !cfg.page_pause.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(cfg.page_pause) => {}
                _ = shutdown_rx.recv() => {
                    info!(identity, "backfill interrupted by shutdown, draining workers");
                    break;
                }
            }
        }
    }

    // Closing the channel lets idle workers exit; busy ones finish their
    // current item first.
    drop(tx);

    let mut report = BackfillReport {
        attempted,
        ..Default::default()
    };
    for handle in workers {
        match handle.await {
            Ok((archived, failed)) => {
                report.archived += archived;
                report.failed += failed;
            }
            Err(e) => warn!(error = %e, "backfill worker panicked"),
        }
    }

    if let Err(e) = session.close().await {
        debug!(error = %e, "session close failed");
    }

    info!(
        identity,
        attempted = report.attempted,
        archived = report.archived,
        failed = report.failed,
        "backfill finished"
    );
    Ok(report)
}

/// Enrich one stub: fetch full context over a plain request, persist the item
/// and an activity record. Comments reference the parent item by id only.
async fn enrich_one(
    extractor: &dyn Extractor,
    store: &dyn SnapshotStore,
    identity: &str,
    stub: &ActivityStub,
) -> anyhow::Result<()> {
    let fields = extractor.extract(&stub.url).await?;

    let item_id = fields
        .id
        .clone()
        .or_else(|| feed::item_id_from_url(&stub.url))
        .unwrap_or_else(|| stub.url.clone());
    let title = fields
        .title
        .as_deref()
        .map(feed::clean_title)
        .unwrap_or_default();

    let stored = store.upsert_item(Item {
        id: item_id,
        url: fields.url.clone().unwrap_or_else(|| stub.url.clone()),
        title,
        price: fields.price.clone(),
        tags: fields.tags.clone(),
        votes: fields.votes,
        first_seen: Utc::now(),
        posted_by: None,
        is_expired: fields.is_expired,
        source: ItemSource::Backfill,
    });
    store.append_snapshot(&stored.id, fields.votes, Utc::now());

    let action = stub.text.to_ascii_lowercase();
    let is_comment = fields.linked_comment_text.is_some()
        || action.contains("commented")
        || action.contains("replied");

    let (role, activity_ref, content) = if is_comment {
        let reference = fields
            .linked_comment_ref
            .clone()
            .or_else(|| feed::comment_ref_from_url(&stub.url))
            .unwrap_or_else(|| format!("unknown-{}", stub.position));
        let content = fields
            .linked_comment_text
            .clone()
            .unwrap_or_else(|| stub.text.clone());
        (ActivityRole::Comment, reference, content)
    } else {
        (
            ActivityRole::Post,
            stored.id.clone(),
            stored.title.clone(),
        )
    };

    store.record_activity(ActivityRecord {
        identity: identity.to_string(),
        item_id: stored.id,
        role,
        activity_ref,
        content,
        recorded_at: Utc::now(),
    });
    Ok(())
}
