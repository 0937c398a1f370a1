// src/poller.rs
//! Feed polling cycle: detect new rows, resolve fields (with hybrid fallback
//! when enrichment is blocked), persist item + snapshot, and fire watchlist
//! alerts at most once per item. Per-item failures are contained here; only
//! session-fatal errors escape to the supervisor.

use chrono::Utc;
use metrics::counter;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, SessionError};
use crate::extract::Extractor;
use crate::feed;
use crate::notify::{AlertPayload, Notifier};
use crate::session::FeedSession;
use crate::store::SnapshotStore;
use crate::types::{
    ActivityRecord, ActivityRole, AlertKind, FeedRow, FeedRowKind, Item, ItemSource,
};

/// Orphaned comment rows are retried once per cycle, then dropped after this
/// many attempts so an unresolvable parent cannot grow the queue forever.
const MAX_PARENT_RETRIES: u32 = 10;

#[derive(Debug)]
struct PendingComment {
    row: FeedRow,
    attempts: u32,
}

pub struct Poller {
    store: Arc<dyn SnapshotStore>,
    extractor: Arc<dyn Extractor>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    base_url: String,
    /// Rows already handled this process; the store is the durable guard,
    /// this just avoids re-extracting on every cycle.
    seen: Mutex<HashSet<String>>,
    pending_comments: Mutex<VecDeque<PendingComment>>,
}

impl Poller {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        extractor: Arc<dyn Extractor>,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
        base_url: &str,
    ) -> Self {
        Self {
            store,
            extractor,
            notifier,
            poll_interval,
            base_url: base_url.trim_end_matches('/').to_string(),
            seen: Mutex::new(HashSet::new()),
            pending_comments: Mutex::new(VecDeque::new()),
        }
    }

    /// Poll until shutdown (`Ok`) or a fatal session error (`Err`). Owns the
    /// session for its whole lifetime and releases it on both paths.
    pub async fn run(
        &self,
        mut session: Box<dyn FeedSession>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), SessionError> {
        let result = self.run_inner(session.as_mut(), &mut shutdown).await;
        if let Err(e) = session.close().await {
            debug!(error = %e, "session close failed");
        }
        result
    }

    async fn run_inner(
        &self,
        session: &mut dyn FeedSession,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), SessionError> {
        loop {
            self.poll_cycle(session).await?;
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => return Ok(()),
            }
        }
    }

    /// One full cycle: retry queued orphan comments, sample the feed, process
    /// every unseen row in feed order.
    pub async fn poll_cycle(&self, session: &mut dyn FeedSession) -> Result<(), SessionError> {
        counter!("monitor_poll_cycles_total").increment(1);

        self.retry_pending_comments().await;

        let raw_rows = session.sample_feed().await?;
        let now = Utc::now();

        for raw in &raw_rows {
            let Some(row) = feed::normalize_row(raw, &self.base_url, now) else {
                continue;
            };
            if row.kind == FeedRowKind::Vote {
                // Vote rows point at deals we either know already or will see
                // through a post/comment row; skip the extra extraction.
                continue;
            }
            if !self.seen.lock().expect("seen mutex poisoned").insert(row.url.clone()) {
                continue;
            }
            counter!("feed_rows_processed_total").increment(1);

            if row.kind == FeedRowKind::Comment {
                self.process_comment(row).await;
            } else {
                self.process_item_row(&row).await;
            }
        }
        Ok(())
    }

    /// Resolve and persist one item row, then check the watchlist. Every
    /// failure in here is transient by definition: log and move on.
    async fn process_item_row(&self, row: &FeedRow) {
        let item = match self.extractor.extract(&row.url).await {
            Ok(fields) => {
                let id = fields.id.clone().unwrap_or_else(|| row.id.clone());
                let url = fields.url.clone().unwrap_or_else(|| row.url.clone());
                let title = match fields.title.as_deref() {
                    Some(t) if !feed::is_placeholder_title(t) => feed::clean_title(t),
                    // Extractor hit a degraded page; the feed row knows better.
                    _ => row.title.clone(),
                };
                let votes = fields.votes;
                let item = Item {
                    id,
                    url,
                    title,
                    price: fields.price.clone(),
                    tags: fields.tags.clone(),
                    votes,
                    first_seen: row.observed_at,
                    posted_by: row.posted_by.clone(),
                    is_expired: fields.is_expired,
                    source: ItemSource::Live,
                };
                let stored = self.store.upsert_item(item);
                self.store.append_snapshot(&stored.id, votes, Utc::now());
                counter!("snapshots_appended_total").increment(1);
                stored
            }
            Err(ExtractError::Blocked) => {
                // Hybrid resolution: the event must not be dropped just
                // because deep enrichment is walled off. Persist what the
                // feed row itself showed; no snapshot, since no vote count
                // was observed.
                counter!("extract_blocked_total").increment(1);
                info!(url = %row.url, "extraction blocked, persisting from feed-row metadata");
                self.store.upsert_item(Item {
                    id: row.id.clone(),
                    url: row.url.clone(),
                    title: row.title.clone(),
                    price: None,
                    tags: Vec::new(),
                    votes: 0,
                    first_seen: row.observed_at,
                    posted_by: row.posted_by.clone(),
                    is_expired: false,
                    source: ItemSource::Live,
                })
            }
            Err(e) => {
                counter!("extract_failures_total").increment(1);
                warn!(url = %row.url, error = %e, "extraction failed, skipping row");
                return;
            }
        };
        counter!("items_upserted_total").increment(1);

        self.check_watchlist(&item).await;
    }

    async fn check_watchlist(&self, item: &Item) {
        if item.is_expired {
            debug!(item = %item.id, "skipping alerts for expired item");
            return;
        }
        let watched = self.store.watched_tags();
        if watched.is_empty() {
            return;
        }
        let matches: Vec<String> = watched
            .into_iter()
            .filter(|w| item.tags.iter().any(|t| t.eq_ignore_ascii_case(w)))
            .collect();
        if matches.is_empty() {
            return;
        }
        if self.store.has_alert(&item.id, AlertKind::Watchlist) {
            debug!(item = %item.id, "watchlist alert already sent");
            return;
        }

        let alert = AlertPayload {
            kind: AlertKind::Watchlist,
            item_id: item.id.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            price: item.price.clone(),
            matched_tags: matches.clone(),
            heat_score: None,
            votes: item.votes,
            ts: Utc::now(),
        };
        match self.notifier.send(&alert).await {
            Ok(()) => {
                self.store.record_alert(&item.id, AlertKind::Watchlist);
                counter!("watchlist_alerts_total").increment(1);
                info!(item = %item.id, tags = ?matches, "watchlist alert sent");
            }
            Err(e) => {
                // Best-effort transport: no retry, no AlertRecord, so the
                // next observation of this item can try again.
                warn!(item = %item.id, error = %e, "watchlist alert dispatch failed");
            }
        }
    }

    /// A comment row is also a fresh observation of its parent deal: refresh
    /// the parent so a new snapshot lands, then attach the comment, queueing
    /// it for retry when the parent stays unknown.
    async fn process_comment(&self, row: FeedRow) {
        self.refresh_comment_parent(&row).await;
        if !self.try_store_comment(&row) {
            self.pending_comments
                .lock()
                .expect("pending mutex poisoned")
                .push_back(PendingComment { row, attempts: 0 });
        }
    }

    /// Comment activity is the only steady-state signal that a deal's votes
    /// moved, so every comment row re-extracts the deal behind it (the
    /// comment URL leads to the node page). No hybrid fallback here: a
    /// blocked or failed refresh observed no vote count, and the comment
    /// itself still goes through the normal resolution path.
    async fn refresh_comment_parent(&self, row: &FeedRow) {
        let fields = match self.extractor.extract(&row.url).await {
            Ok(fields) => fields,
            Err(ExtractError::Blocked) => {
                counter!("extract_blocked_total").increment(1);
                debug!(url = %row.url, "extraction blocked, parent refresh skipped");
                return;
            }
            Err(e) => {
                counter!("extract_failures_total").increment(1);
                warn!(url = %row.url, error = %e, "parent refresh failed, skipping");
                return;
            }
        };

        let id = fields
            .id
            .clone()
            .or_else(|| row.parent_id.clone())
            .unwrap_or_else(|| row.id.clone());
        let title = fields
            .title
            .as_deref()
            .map(feed::clean_title)
            .unwrap_or_default();
        // The commenter is not the deal poster; upsert keeps any known one.
        let stored = self.store.upsert_item(Item {
            id,
            url: fields.url.clone().unwrap_or_else(|| row.url.clone()),
            title,
            price: fields.price.clone(),
            tags: fields.tags.clone(),
            votes: fields.votes,
            first_seen: row.observed_at,
            posted_by: None,
            is_expired: fields.is_expired,
            source: ItemSource::Live,
        });
        self.store.append_snapshot(&stored.id, fields.votes, Utc::now());
        counter!("snapshots_appended_total").increment(1);
        counter!("items_upserted_total").increment(1);

        self.check_watchlist(&stored).await;
    }

    fn try_store_comment(&self, row: &FeedRow) -> bool {
        let parent = row
            .parent_id
            .as_deref()
            .filter(|id| self.store.get_item(id).is_some())
            .map(str::to_string)
            .or_else(|| self.store.find_item_by_title(&row.title));

        let Some(parent_id) = parent else {
            return false;
        };
        let activity_ref = feed::comment_ref_from_url(&row.url)
            .unwrap_or_else(|| row.id.replace('/', "-"));
        self.store.record_activity(ActivityRecord {
            identity: row.posted_by.clone().unwrap_or_default(),
            item_id: parent_id,
            role: ActivityRole::Comment,
            activity_ref,
            content: row.title.clone(),
            recorded_at: Utc::now(),
        });
        true
    }

    async fn retry_pending_comments(&self) {
        let drained: Vec<PendingComment> = {
            let mut q = self.pending_comments.lock().expect("pending mutex poisoned");
            q.drain(..).collect()
        };
        if drained.is_empty() {
            return;
        }
        for mut pending in drained {
            if self.try_store_comment(&pending.row) {
                debug!(comment = %pending.row.id, "orphaned comment resolved");
                continue;
            }
            pending.attempts += 1;
            if pending.attempts >= MAX_PARENT_RETRIES {
                warn!(
                    comment = %pending.row.id,
                    attempts = pending.attempts,
                    "dropping comment row, parent never resolved"
                );
                continue;
            }
            self.pending_comments
                .lock()
                .expect("pending mutex poisoned")
                .push_back(pending);
        }
    }

    /// Number of comment rows currently waiting for their parent.
    pub fn pending_comment_count(&self) -> usize {
        self.pending_comments
            .lock()
            .expect("pending mutex poisoned")
            .len()
    }
}
