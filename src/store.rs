// src/store.rs
//! Snapshot store: current item records, the append-only snapshot log, alert
//! history, the operator watchlist, and the backfill activity archive.
//!
//! The trait is synchronous from the engine's point of view; a durable
//! backend may do async I/O internally behind it. `MemoryStore` is the
//! in-process implementation used by the binaries and tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{ActivityRecord, AlertKind, Item, ItemSource, Snapshot};

pub trait SnapshotStore: Send + Sync {
    /// Insert or update an item, returning the stored record. Idempotent per
    /// id. `first_seen` and `source` are fixed at creation; a zero vote count
    /// never overwrites a positive stored one (a bot-walled scrape must not
    /// wipe real counts), and placeholder titles never replace real ones.
    fn upsert_item(&self, incoming: Item) -> Item;

    fn get_item(&self, id: &str) -> Option<Item>;

    /// Resolve an item id by exact title, used to attach orphaned comment
    /// rows to their parent deal.
    fn find_item_by_title(&self, title: &str) -> Option<String>;

    /// Append one vote-count observation. `captured_at` is clamped forward to
    /// the item's latest snapshot so the per-item log stays monotonic.
    fn append_snapshot(&self, item_id: &str, votes: i64, captured_at: DateTime<Utc>);

    /// The two most recent snapshots for the item as `(previous, latest)`,
    /// or `None` when fewer than two exist.
    fn latest_two_snapshots(&self, item_id: &str) -> Option<(Snapshot, Snapshot)>;

    /// All items having at least `min_snapshots` snapshots.
    fn items_with_snapshots(&self, min_snapshots: usize) -> Vec<Item>;

    fn has_alert(&self, item_id: &str, kind: AlertKind) -> bool;

    /// Record that an alert was dispatched. First write wins; returns `false`
    /// when an alert of this kind was already recorded for the item.
    fn record_alert(&self, item_id: &str, kind: AlertKind) -> bool;

    fn watched_tags(&self) -> Vec<String>;

    /// Replace the watchlist. Called by the config reload task; the engine
    /// itself only reads.
    fn set_watched_tags(&self, tags: Vec<String>);

    fn record_activity(&self, record: ActivityRecord);

    fn activity_for(&self, identity: &str) -> Vec<ActivityRecord>;

    /// Drop snapshots older than `cutoff`; returns how many were removed.
    /// Trend queries only ever need recent history.
    fn prune_snapshots_older_than(&self, cutoff: DateTime<Utc>) -> usize;
}

#[derive(Default)]
struct Inner {
    items: HashMap<String, Item>,
    snapshots: HashMap<String, Vec<Snapshot>>,
    alerts: HashMap<(String, AlertKind), DateTime<Utc>>,
    watched_tags: Vec<String>,
    activity: Vec<ActivityRecord>,
}

/// In-memory store. A single mutex serializes writes, which preserves the
/// monotonic-append invariant under any task interleaving.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn upsert_item(&self, incoming: Item) -> Item {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let merged = match inner.items.get(&incoming.id) {
            None => incoming,
            Some(existing) => {
                let mut m = incoming;
                m.first_seen = existing.first_seen;
                // Live observations outrank archived backfill context.
                if existing.source == ItemSource::Live {
                    m.source = ItemSource::Live;
                }
                if m.votes == 0 && existing.votes > 0 {
                    m.votes = existing.votes;
                }
                if crate::feed::is_placeholder_title(&m.title)
                    && !crate::feed::is_placeholder_title(&existing.title)
                {
                    m.title = existing.title.clone();
                }
                if m.price.is_none() {
                    m.price = existing.price.clone();
                }
                if m.tags.is_empty() {
                    m.tags = existing.tags.clone();
                }
                if m.posted_by.is_none() {
                    m.posted_by = existing.posted_by.clone();
                }
                m
            }
        };
        inner.items.insert(merged.id.clone(), merged.clone());
        merged
    }

    fn get_item(&self, id: &str) -> Option<Item> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.items.get(id).cloned()
    }

    fn find_item_by_title(&self, title: &str) -> Option<String> {
        if title.trim().is_empty() {
            return None;
        }
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .items
            .values()
            .find(|it| it.id.starts_with("node/") && it.title == title)
            .map(|it| it.id.clone())
    }

    fn append_snapshot(&self, item_id: &str, votes: i64, captured_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let log = inner.snapshots.entry(item_id.to_string()).or_default();
        let at = match log.last() {
            Some(last) if captured_at < last.captured_at => last.captured_at,
            _ => captured_at,
        };
        log.push(Snapshot {
            item_id: item_id.to_string(),
            votes,
            captured_at: at,
        });
    }

    fn latest_two_snapshots(&self, item_id: &str) -> Option<(Snapshot, Snapshot)> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let log = inner.snapshots.get(item_id)?;
        if log.len() < 2 {
            return None;
        }
        let latest = log[log.len() - 1].clone();
        let prev = log[log.len() - 2].clone();
        Some((prev, latest))
    }

    fn items_with_snapshots(&self, min_snapshots: usize) -> Vec<Item> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .items
            .values()
            .filter(|it| {
                inner
                    .snapshots
                    .get(&it.id)
                    .map(|log| log.len() >= min_snapshots)
                    .unwrap_or(min_snapshots == 0)
            })
            .cloned()
            .collect()
    }

    fn has_alert(&self, item_id: &str, kind: AlertKind) -> bool {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.alerts.contains_key(&(item_id.to_string(), kind))
    }

    fn record_alert(&self, item_id: &str, kind: AlertKind) -> bool {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let key = (item_id.to_string(), kind);
        if inner.alerts.contains_key(&key) {
            return false;
        }
        inner.alerts.insert(key, Utc::now());
        true
    }

    fn watched_tags(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.watched_tags.clone()
    }

    fn set_watched_tags(&self, tags: Vec<String>) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.watched_tags = tags;
    }

    fn record_activity(&self, record: ActivityRecord) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        // activity_ref is the natural key; re-archiving replaces in place.
        if let Some(existing) = inner
            .activity
            .iter_mut()
            .find(|r| r.identity == record.identity && r.activity_ref == record.activity_ref)
        {
            *existing = record;
        } else {
            inner.activity.push(record);
        }
    }

    fn activity_for(&self, identity: &str) -> Vec<ActivityRecord> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .activity
            .iter()
            .filter(|r| r.identity == identity)
            .cloned()
            .collect()
    }

    fn prune_snapshots_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let mut removed = 0;
        for log in inner.snapshots.values_mut() {
            let before = log.len();
            log.retain(|s| s.captured_at >= cutoff);
            removed += before - log.len();
        }
        removed
    }
}
