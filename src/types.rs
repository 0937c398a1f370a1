// src/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of alert sent for an item. At most one alert of each kind is ever
/// dispatched per item; the store's alert history enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Watchlist,
    Trending,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Watchlist => "watchlist",
            AlertKind::Trending => "trending",
        }
    }
}

/// How an item first entered the store. Backfill-sourced items are archived
/// context, not live observations, and are excluded from trend evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    Live,
    Backfill,
}

/// Current state of one observed item. Created on first observation and never
/// deleted; `votes` and `is_expired` track the latest observation, everything
/// else is fixed at creation (missing fields may be filled in later if the
/// first observation was degraded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub url: String,
    pub title: String,
    pub price: Option<String>,
    pub tags: Vec<String>,
    pub votes: i64,
    pub first_seen: DateTime<Utc>,
    pub posted_by: Option<String>,
    pub is_expired: bool,
    pub source: ItemSource,
}

/// One timestamped vote-count observation. Append-only; per item the
/// `captured_at` values are monotonically increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub item_id: String,
    pub votes: i64,
    pub captured_at: DateTime<Utc>,
}

/// Raw cells of one live-feed row, exactly as the session read them off the
/// page. `feed::normalize_row` turns this into a `FeedRow`.
#[derive(Debug, Clone, Default)]
pub struct RawFeedRow {
    pub time_str: String,
    pub user: String,
    pub action: String,
    pub subject: String,
    pub href: String,
    pub kind_label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedRowKind {
    Post,
    Comment,
    Vote,
}

/// A normalized live-feed row ready for processing.
#[derive(Debug, Clone)]
pub struct FeedRow {
    /// Canonical id of the row's target ("node/123" or "comment/456"),
    /// falling back to the full URL when no id could be parsed.
    pub id: String,
    /// For comment rows whose URL carries the parent node, the parent id.
    pub parent_id: Option<String>,
    pub url: String,
    pub title: String,
    pub posted_by: Option<String>,
    pub kind: FeedRowKind,
    pub observed_at: DateTime<Utc>,
}

/// One raw entry revealed by scrolling an identity's activity page.
/// `position` is the stub's index in site-native traversal order, assigned by
/// the traversal stage; enriched output carries no ordering guarantee.
#[derive(Debug, Clone)]
pub struct ActivityStub {
    pub position: usize,
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityRole {
    Post,
    Comment,
}

/// Archived activity of a backfilled identity. Comments reference their
/// parent `Item` by id only; parent data is never embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub identity: String,
    pub item_id: String,
    pub role: ActivityRole,
    pub activity_ref: String,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
}

/// Structured fields returned by the extraction service for one item page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFields {
    pub id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub is_expired: bool,
    pub linked_comment_ref: Option<String>,
    pub linked_comment_text: Option<String>,
}
