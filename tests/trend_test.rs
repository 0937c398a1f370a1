// tests/trend_test.rs
mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::*;
use std::sync::Arc;

use dealwatch::store::{MemoryStore, SnapshotStore};
use dealwatch::trend::TrendDetector;
use dealwatch::types::{AlertKind, Item, ItemSource};

fn t(min: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(min)
}

fn live_item(id: &str) -> Item {
    Item {
        id: id.to_string(),
        url: format!("{BASE}/{id}"),
        title: format!("Deal {id}"),
        price: Some("$10".into()),
        tags: vec![],
        votes: 0,
        first_seen: t(0),
        posted_by: None,
        is_expired: false,
        source: ItemSource::Live,
    }
}

fn detector(
    store: &Arc<MemoryStore>,
    notifier: &Arc<RecordingNotifier>,
    threshold: f64,
) -> TrendDetector {
    TrendDetector::new(
        Arc::clone(store) as Arc<dyn SnapshotStore>,
        Arc::clone(notifier) as _,
        threshold,
    )
}

#[tokio::test]
async fn spec_scenario_fires_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_item(live_item("node/X123"));
    store.append_snapshot("node/X123", 10, t(0));
    store.append_snapshot("node/X123", 70, t(10));

    let notifier = Arc::new(RecordingNotifier::new());
    let d = detector(&store, &notifier, 60.0);

    assert_eq!(d.check_once().await, 1);
    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent[0].kind, AlertKind::Trending);
    assert_eq!(sent[0].heat_score, Some(60.0));
    assert_eq!(sent[0].votes, 70);
    drop(sent);

    // Once trending, never re-evaluated, even after a bigger spike.
    store.append_snapshot("node/X123", 300, t(20));
    assert_eq!(d.check_once().await, 0);
    assert_eq!(notifier.sent_count(), 1);
}

#[tokio::test]
async fn only_two_most_recent_snapshots_count() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_item(live_item("node/1"));
    // Early spike, then a plateau: the old spike must not keep triggering.
    store.append_snapshot("node/1", 0, t(0));
    store.append_snapshot("node/1", 80, t(1)); // 800/min-scaled back then
    store.append_snapshot("node/1", 81, t(20)); // latest pair: ~0.5

    let notifier = Arc::new(RecordingNotifier::new());
    let d = detector(&store, &notifier, 60.0);
    assert_eq!(d.check_once().await, 0);
}

#[tokio::test]
async fn single_snapshot_items_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_item(live_item("node/2"));
    store.append_snapshot("node/2", 500, t(0));

    let notifier = Arc::new(RecordingNotifier::new());
    let d = detector(&store, &notifier, 1.0);
    assert_eq!(d.check_once().await, 0);
}

#[tokio::test]
async fn backfill_and_expired_items_are_excluded() {
    let store = Arc::new(MemoryStore::new());
    let mut archived = live_item("node/3");
    archived.source = ItemSource::Backfill;
    store.upsert_item(archived);
    store.append_snapshot("node/3", 0, t(0));
    store.append_snapshot("node/3", 1000, t(1));

    let mut expired = live_item("node/4");
    expired.is_expired = true;
    store.upsert_item(expired);
    store.append_snapshot("node/4", 0, t(0));
    store.append_snapshot("node/4", 1000, t(1));

    let notifier = Arc::new(RecordingNotifier::new());
    let d = detector(&store, &notifier, 1.0);
    assert_eq!(d.check_once().await, 0);
}

#[tokio::test]
async fn first_sweep_runs_at_startup() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_item(live_item("node/6"));
    store.append_snapshot("node/6", 0, t(0));
    store.append_snapshot("node/6", 100, t(10));

    let notifier = Arc::new(RecordingNotifier::new());
    let d = detector(&store, &notifier, 60.0);
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let rx = shutdown_tx.subscribe();
    let task = tokio::spawn(async move {
        d.run(std::time::Duration::from_secs(3600), rx).await;
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(
        notifier.sent_count(),
        1,
        "startup sweep must not wait a full interval"
    );
    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .expect("detector must exit on shutdown")
        .unwrap();
}

#[tokio::test]
async fn failed_dispatch_is_retried_on_next_sweep() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_item(live_item("node/5"));
    store.append_snapshot("node/5", 0, t(0));
    store.append_snapshot("node/5", 100, t(10));

    let notifier = Arc::new(RecordingNotifier::new());
    notifier.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let d = detector(&store, &notifier, 60.0);

    assert_eq!(d.check_once().await, 0);
    assert!(!store.has_alert("node/5", AlertKind::Trending));

    notifier.fail.store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(d.check_once().await, 1);
    assert!(store.has_alert("node/5", AlertKind::Trending));
}
