// src/notify/mod.rs
pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::AlertKind;

/// Everything an alert message needs; formatting is the dispatcher's job.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    pub kind: AlertKind,
    pub item_id: String,
    pub title: String,
    pub url: String,
    pub price: Option<String>,
    /// Tags that matched the watchlist (watchlist alerts only).
    pub matched_tags: Vec<String>,
    /// Heat score that crossed the threshold (trending alerts only).
    pub heat_score: Option<f64>,
    pub votes: i64,
    pub ts: DateTime<Utc>,
}

/// Outbound alert transport. Delivery is best-effort: callers log a failed
/// send and move on; any retry policy lives inside the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &AlertPayload) -> anyhow::Result<()>;
}

/// Fallback used when no transport is configured: alerts go to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &AlertPayload) -> anyhow::Result<()> {
        tracing::info!(
            kind = alert.kind.as_str(),
            item = %alert.item_id,
            title = %alert.title,
            heat = ?alert.heat_score,
            tags = ?alert.matched_tags,
            "alert (no transport configured)"
        );
        Ok(())
    }
}
