// src/trend.rs
//! Trend detection: turn the snapshot log into a heat score and alert when an
//! item crosses the threshold. An item that has trended once is never
//! re-evaluated; the alert history in the store makes that durable across
//! restarts.

use chrono::Utc;
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::notify::{AlertPayload, Notifier};
use crate::store::SnapshotStore;
use crate::types::{AlertKind, ItemSource, Snapshot};

/// Fixed scaling constant that maps raw votes-per-minute velocity onto the
/// 0-100+ range the threshold is expressed in.
pub const HEAT_SCALE: f64 = 10.0;

/// Heat score from the two most recent snapshots: vote delta per elapsed
/// minute, scaled. Elapsed time is floored at one minute so back-to-back
/// snapshots cannot blow the score up. Negative when votes were corrected
/// downward; such items simply never trend.
pub fn heat_score(prev: &Snapshot, latest: &Snapshot) -> f64 {
    let delta = (latest.votes - prev.votes) as f64;
    let elapsed_min = (latest.captured_at - prev.captured_at).num_seconds() as f64 / 60.0;
    delta / elapsed_min.max(1.0) * HEAT_SCALE
}

pub struct TrendDetector {
    store: Arc<dyn SnapshotStore>,
    notifier: Arc<dyn Notifier>,
    threshold: f64,
}

impl TrendDetector {
    pub fn new(store: Arc<dyn SnapshotStore>, notifier: Arc<dyn Notifier>, threshold: f64) -> Self {
        Self {
            store,
            notifier,
            threshold,
        }
    }

    /// Timer loop; the first tick of the interval fires immediately, so a
    /// restarted monitor sweeps right away instead of waiting a full
    /// interval. Returns when the shutdown signal fires.
    pub async fn run(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let fired = self.check_once().await;
                    debug!(alerts = fired, "trend check complete");
                }
                _ = shutdown.recv() => return,
            }
        }
    }

    /// Evaluate every live item with at least two snapshots; returns how many
    /// trending alerts were dispatched.
    pub async fn check_once(&self) -> usize {
        counter!("trend_checks_total").increment(1);
        let mut fired = 0;

        for item in self.store.items_with_snapshots(2) {
            if item.source == ItemSource::Backfill || item.is_expired {
                continue;
            }
            if self.store.has_alert(&item.id, AlertKind::Trending) {
                continue;
            }
            let Some((prev, latest)) = self.store.latest_two_snapshots(&item.id) else {
                continue;
            };

            let score = heat_score(&prev, &latest);
            gauge!("trend_last_heat_score").set(score);
            if score < self.threshold {
                continue;
            }

            let alert = AlertPayload {
                kind: AlertKind::Trending,
                item_id: item.id.clone(),
                title: item.title.clone(),
                url: item.url.clone(),
                price: item.price.clone(),
                matched_tags: Vec::new(),
                heat_score: Some(score),
                votes: latest.votes,
                ts: Utc::now(),
            };
            match self.notifier.send(&alert).await {
                Ok(()) => {
                    self.store.record_alert(&item.id, AlertKind::Trending);
                    counter!("trending_alerts_total").increment(1);
                    info!(item = %item.id, score, "trending alert sent");
                    fired += 1;
                }
                Err(e) => {
                    warn!(item = %item.id, error = %e, "trending alert dispatch failed");
                }
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

    fn snap(votes: i64, at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            item_id: "node/1".into(),
            votes,
            captured_at: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn spec_scenario_ten_minutes_sixty_votes() {
        let prev = snap(10, t0());
        let latest = snap(70, t0() + ChronoDuration::minutes(10));
        assert_eq!(heat_score(&prev, &latest), 60.0);
    }

    #[test]
    fn elapsed_floored_at_one_minute() {
        let prev = snap(0, t0());
        let latest = snap(6, t0() + ChronoDuration::seconds(5));
        // 6 votes over 5 seconds counts as 6 votes over 1 minute.
        assert_eq!(heat_score(&prev, &latest), 60.0);
    }

    #[test]
    fn vote_correction_gives_negative_score() {
        let prev = snap(50, t0());
        let latest = snap(40, t0() + ChronoDuration::minutes(10));
        assert!(heat_score(&prev, &latest) < 0.0);
    }
}
