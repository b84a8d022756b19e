// tests/sweep.rs
//
// One-cycle scheduler behavior, driven directly through `run_sweep`.

mod common;

use common::{harness, harness_with, items, settings, tracker};
use listing_tracker::admission::normalize_query;
use listing_tracker::scheduler::NotifyOrder;
use listing_tracker::store::TrackerStore;
use listing_tracker::tracker::SeenIds;
use listing_tracker::{
    create_tracker, delete_tracker, list_trackers, run_sweep, ChannelId, RemoveOutcome,
    TrackerFilter,
};
use url::Url;

#[tokio::test]
async fn new_items_are_announced_and_seen_set_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), vec![tracker("q1", 1, "111|222")]);
    h.source.set_items("q1", items(&["333", "222", "444"]));

    let report = run_sweep(&h.state).await;

    assert_eq!(report.polled, 1);
    assert_eq!(report.new_items, 2);
    assert!(report.persisted);
    // Default order: oldest of the window first.
    assert_eq!(h.notifier.sent_ids(1), vec!["444", "333"]);

    let t = &h.state.snapshot().await[0];
    assert!(t.seen().same_set(&SeenIds::decode("333|222|444")));
    assert!(t.last_checked_at().timestamp() > 1_700_000_000);
}

#[tokio::test]
async fn fetched_order_announces_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings();
    s.notify_order = NotifyOrder::Fetched;
    let h = harness_with(dir.path(), vec![tracker("q1", 1, "111|222")], s);
    h.source.set_items("q1", items(&["333", "222", "444"]));

    run_sweep(&h.state).await;
    assert_eq!(h.notifier.sent_ids(1), vec!["333", "444"]);
}

#[tokio::test]
async fn only_the_window_is_compared() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), vec![tracker("q1", 1, "1|2|3|4|5")]);
    h.source
        .set_items("q1", items(&["1", "2", "3", "4", "5", "6", "7"]));

    let report = run_sweep(&h.state).await;
    assert_eq!(report.new_items, 0);
    let t = &h.state.snapshot().await[0];
    assert_eq!(t.seen().len(), 5);
    assert!(!t.seen().contains("6"));
}

#[tokio::test]
async fn fetch_failure_is_isolated_to_its_tracker() {
    let dir = tempfile::tempdir().unwrap();
    let a = tracker("qa", 1, "a1|a2");
    let h = harness(dir.path(), vec![a.clone(), tracker("qb", 2, "b1")]);
    h.source.set_failing("qa", true);
    h.source.set_items("qb", items(&["b2", "b1"]));

    let report = run_sweep(&h.state).await;

    assert_eq!(report.fetch_failed, 1);
    assert_eq!(report.polled, 1);
    assert_eq!(h.notifier.sent_ids(2), vec!["b2"]);

    let snap = h.state.snapshot().await;
    let after_a = snap.iter().find(|t| t.query() == "qa").unwrap();
    assert_eq!(after_a.seen(), a.seen());
    assert_eq!(after_a.last_checked_at(), a.last_checked_at());
}

#[tokio::test]
async fn empty_page_keeps_previous_state() {
    let dir = tempfile::tempdir().unwrap();
    let before = tracker("q1", 1, "x|y");
    let h = harness(dir.path(), vec![before.clone()]);
    h.source.set_items("q1", vec![]);

    let report = run_sweep(&h.state).await;
    assert_eq!(report.fetch_failed, 1);
    assert_eq!(h.notifier.total(), 0);
    assert_eq!(h.state.snapshot().await[0], before);
}

#[tokio::test]
async fn unresolved_channel_is_skipped_without_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let before = tracker("q1", 1, "x");
    let h = harness(dir.path(), vec![before.clone(), tracker("q2", 2, "y")]);
    h.notifier.forget(1);
    h.source.set_items("q1", items(&["new"]));
    h.source.set_items("q2", items(&["z", "y"]));

    let report = run_sweep(&h.state).await;
    assert_eq!(report.unresolved, 1);
    assert_eq!(report.polled, 1);
    assert_eq!(h.source.calls(), vec!["q2".to_string()]);
    assert_eq!(h.state.snapshot().await[0], before);
    assert_eq!(h.notifier.sent_ids(2), vec!["z"]);
}

#[tokio::test]
async fn failed_delivery_still_advances_state() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), vec![tracker("q1", 1, "old")]);
    h.notifier.fail(1);
    h.source.set_items("q1", items(&["n1", "n2", "old"]));

    let report = run_sweep(&h.state).await;
    assert_eq!(report.notify_failed, 2);
    assert_eq!(report.polled, 1);

    // Next sweep with the same page announces nothing again.
    let report = run_sweep(&h.state).await;
    assert_eq!(report.new_items, 0);
    assert!(h.state.snapshot().await[0]
        .seen()
        .same_set(&SeenIds::decode("n1|n2|old")));
}

#[tokio::test]
async fn sweep_result_is_persisted_once_at_the_end() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec![tracker("q1", 1, "a"), tracker("q2", 1, "b")],
    );
    h.source.set_items("q1", items(&["a2", "a"]));
    h.source.set_failing("q2", true);

    run_sweep(&h.state).await;

    let reloaded = TrackerStore::new(dir.path().join("trackers.csv"))
        .load()
        .unwrap();
    assert_eq!(reloaded, h.state.snapshot().await);
    assert_eq!(reloaded[0].seen(), &SeenIds::decode("a2|a"));
    assert_eq!(reloaded[1].seen(), &SeenIds::decode("b"));
}

#[tokio::test]
async fn store_failure_does_not_lose_in_memory_progress() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the file should be makes the rename fail.
    std::fs::create_dir_all(dir.path().join("trackers.csv")).unwrap();
    let h = harness(dir.path(), vec![tracker("q1", 1, "a")]);
    h.source.set_items("q1", items(&["b", "a"]));

    let report = run_sweep(&h.state).await;
    assert!(!report.persisted);
    assert_eq!(report.new_items, 1);

    let again = run_sweep(&h.state).await;
    assert_eq!(again.new_items, 0, "same items must not be re-announced");
}

#[tokio::test(start_paused = true)]
async fn hanging_fetch_times_out_and_sweep_continues() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec![tracker("slow", 1, "s"), tracker("fast", 2, "f")],
    );
    h.source.set_hanging("slow", true);
    h.source.set_items("fast", items(&["f2", "f"]));

    let report = run_sweep(&h.state).await;
    assert_eq!(report.fetch_failed, 1);
    assert_eq!(report.polled, 1);
    assert_eq!(h.notifier.sent_ids(2), vec!["f2"]);
}

#[tokio::test(start_paused = true)]
async fn trackers_removed_mid_sweep_stay_removed() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec![tracker("slow", 1, "s"), tracker("q1", 1, "a")],
    );
    h.source.set_hanging("slow", true);
    h.source.set_items("q1", items(&["b", "a"]));

    let sweep = tokio::spawn({
        let state = h.state.clone();
        async move { run_sweep(&state).await }
    });
    // Wait until the sweep is parked on the slow fetch.
    while h.source.calls().is_empty() {
        tokio::task::yield_now().await;
    }

    let removed = delete_tracker(&h.state, Some("q1"), ChannelId(1))
        .await
        .unwrap();
    assert!(matches!(removed, RemoveOutcome::Removed(_)));

    let report = sweep.await.unwrap();
    assert_eq!(report.polled, 1, "q1 was polled from the snapshot");
    let left = list_trackers(&h.state, TrackerFilter::All).await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].query(), "slow");

    let reloaded = TrackerStore::new(dir.path().join("trackers.csv"))
        .load()
        .unwrap();
    assert_eq!(reloaded, left);
}

#[tokio::test(start_paused = true)]
async fn tracker_re_added_mid_sweep_keeps_its_new_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let q = normalize_query(
        "https://www.vinted.es/catalog?search_text=lego",
        &Url::parse(common::MARKET).unwrap(),
    )
    .unwrap();
    let h = harness(
        dir.path(),
        vec![tracker("slow", 1, "s"), tracker(&q, 1, "a")],
    );
    h.source.set_hanging("slow", true);

    let sweep = tokio::spawn({
        let state = h.state.clone();
        async move { run_sweep(&state).await }
    });
    while h.source.calls().is_empty() {
        tokio::task::yield_now().await;
    }

    // Remove and re-add while the sweep is parked; the new baseline is c,b,a.
    delete_tracker(&h.state, Some(&q), ChannelId(1)).await.unwrap();
    h.source.set_items(&q, items(&["c", "b", "a"]));
    create_tracker(&h.state, &q, ChannelId(1)).await.unwrap();
    // The parked sweep then sees an older page.
    h.source.set_items(&q, items(&["b", "a"]));

    sweep.await.unwrap();
    let after = list_trackers(&h.state, TrackerFilter::Destination(ChannelId(1))).await;
    let re_added = after.iter().find(|t| t.query() == q).unwrap();
    assert!(
        re_added.seen().same_set(&SeenIds::decode("c|b|a")),
        "stale sweep result must not replace the new baseline"
    );

    let announced = h.notifier.total();
    h.source.set_hanging("slow", false);
    h.source.set_items("slow", items(&["s"]));
    h.source.set_items(&q, items(&["c", "b", "a"]));
    let report = run_sweep(&h.state).await;
    assert_eq!(report.new_items, 0);
    assert_eq!(h.notifier.total(), announced, "baseline items are never announced");

    let reloaded = TrackerStore::new(dir.path().join("trackers.csv"))
        .load()
        .unwrap();
    assert_eq!(reloaded, list_trackers(&h.state, TrackerFilter::All).await);
}
