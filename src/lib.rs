// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod backfill;
pub mod config;
pub mod error;
pub mod extract;
pub mod feed;
pub mod notify;
pub mod poller;
pub mod session;
pub mod store;
pub mod trend;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::backfill::{fetch_activity, BackfillReport};
pub use crate::error::{ExtractError, SessionError, TraversalError};
pub use crate::notify::{AlertPayload, Notifier};
pub use crate::session::{run_supervised, FeedSession, SessionFactory};
pub use crate::store::{MemoryStore, SnapshotStore};
pub use crate::types::{ActivityRecord, AlertKind, Item, ItemSource, Snapshot};

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration so series show up as soon as an embedder
/// installs a recorder.
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_poll_cycles_total", "Completed feed poll cycles.");
        describe_counter!(
            "feed_rows_processed_total",
            "Feed rows accepted for processing (after filtering and dedup)."
        );
        describe_counter!("items_upserted_total", "Item records inserted or refreshed.");
        describe_counter!("snapshots_appended_total", "Vote-count snapshots appended.");
        describe_counter!("extract_blocked_total", "Extractions blocked by the site.");
        describe_counter!("extract_failures_total", "Extractions that failed outright.");
        describe_counter!("watchlist_alerts_total", "Watchlist alerts dispatched.");
        describe_counter!("trending_alerts_total", "Trending alerts dispatched.");
        describe_counter!("trend_checks_total", "Trend detector sweeps.");
        describe_counter!(
            "session_restarts_total",
            "Observation sessions replaced after a fatal error."
        );
        describe_counter!("backfill_stubs_total", "Stubs discovered by backfill traversal.");
        describe_counter!("backfill_archived_total", "Backfill items archived.");
        describe_counter!("backfill_failed_total", "Backfill items skipped on error.");
        describe_gauge!("trend_last_heat_score", "Most recently computed heat score.");
    });
}
