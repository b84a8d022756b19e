// src/scheduler.rs
//! Poll scheduler: one sweep over all trackers per interval.
//!
//! A sweep works on a snapshot of the tracker set so admission requests are
//! never blocked behind network calls. Results are written back by
//! `(query, destination)`, only onto a tracker still equal to the polled one,
//! and the whole set is persisted once at sweep end.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use metrics::{counter, gauge};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::diff::diff;
use crate::item::Item;
use crate::notify::Notifier;
use crate::source::{fetch_window, FetchError, ItemSource};
use crate::store::TrackerStore;
use crate::tracker::{SeenIds, Tracker, TrackerSet};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(45);
/// Only the most recent listings of a page are compared between sweeps.
pub const DEFAULT_WINDOW: usize = 5;

/// Order in which one tracker's new items are announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOrder {
    /// Oldest of the window first, so the newest listing ends up last in chat.
    #[default]
    OldestFirst,
    /// As the page lists them (newest first).
    Fetched,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub fetch_timeout: Duration,
    pub window: usize,
    pub notify_order: NotifyOrder,
    /// Queries must live on this scheme + host.
    pub marketplace: Url,
}

impl PollSettings {
    pub fn new(marketplace: Url) -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            window: DEFAULT_WINDOW,
            notify_order: NotifyOrder::default(),
            marketplace,
        }
    }
}

/// Everything the engine shares: owned by the entry point and handed by
/// reference to the scheduler and to the admission handlers.
pub struct SchedulerState {
    /// Guards read-modify-write of the working set together with `save_all`.
    pub(crate) trackers: Mutex<TrackerSet>,
    pub(crate) store: TrackerStore,
    pub(crate) source: Arc<dyn ItemSource>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) settings: PollSettings,
}

impl SchedulerState {
    pub fn new(
        trackers: TrackerSet,
        store: TrackerStore,
        source: Arc<dyn ItemSource>,
        notifier: Arc<dyn Notifier>,
        settings: PollSettings,
    ) -> Self {
        gauge!("trackers_active").set(trackers.len() as f64);
        Self {
            trackers: Mutex::new(trackers),
            store,
            source,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn store(&self) -> &TrackerStore {
        &self.store
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub async fn snapshot(&self) -> Vec<Tracker> {
        self.trackers.lock().await.to_vec()
    }
}

/// Wall-clock time at the precision the tracker file keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Totals for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub trackers: usize,
    pub polled: usize,
    pub unresolved: usize,
    pub fetch_failed: usize,
    pub new_items: usize,
    pub notify_failed: usize,
    pub persisted: bool,
}

enum PollOutcome {
    Unresolved,
    FetchFailed,
    Polled {
        checked_at: DateTime<Utc>,
        seen: SeenIds,
        new_items: usize,
        notify_failed: usize,
    },
}

async fn poll_tracker(state: &SchedulerState, tracker: &Tracker) -> PollOutcome {
    let destination = tracker.destination();
    let query = tracker.query();

    if !state.notifier.resolve(destination).await {
        tracing::warn!(target: "scheduler", channel = %destination, query, "channel not found, skipping tracker");
        counter!("tracker_unresolved_total").increment(1);
        return PollOutcome::Unresolved;
    }

    let settings = &state.settings;
    let fetched = fetch_window(
        state.source.as_ref(),
        query,
        settings.fetch_timeout,
        settings.window,
    )
    .await
    .and_then(|items| {
        if items.is_empty() {
            Err(FetchError::Empty)
        } else {
            Ok(items)
        }
    });

    let items = match fetched {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(target: "scheduler", query, error = %e, "fetch failed, retrying next sweep");
            counter!("tracker_fetch_errors_total").increment(1);
            return PollOutcome::FetchFailed;
        }
    };

    let d = diff(tracker.seen(), &items);
    let announce: Vec<&Item> = match settings.notify_order {
        NotifyOrder::OldestFirst => d.new_items.iter().rev().copied().collect(),
        NotifyOrder::Fetched => d.new_items.clone(),
    };

    let mut notify_failed = 0;
    for item in &announce {
        match state.notifier.notify(destination, item).await {
            Ok(()) => {
                tracing::info!(target: "scheduler", channel = %destination, id = %item.id, "sent new item");
            }
            Err(e) => {
                notify_failed += 1;
                counter!("tracker_notify_errors_total").increment(1);
                tracing::warn!(target: "scheduler", channel = %destination, id = %item.id, error = %e, "notification failed");
            }
        }
    }
    counter!("tracker_new_items_total").increment(announce.len() as u64);

    PollOutcome::Polled {
        checked_at: now(),
        seen: d.seen,
        new_items: announce.len(),
        notify_failed,
    }
}

/// One full pass over every tracker, then a single `save_all`.
///
/// Per-tracker failures are logged and counted, never propagated.
pub async fn run_sweep(state: &SchedulerState) -> SweepReport {
    crate::metrics::ensure_described();

    let snapshot = state.snapshot().await;
    tracing::info!(target: "scheduler", trackers = snapshot.len(), "checking trackers for updates");

    let mut report = SweepReport {
        trackers: snapshot.len(),
        ..SweepReport::default()
    };
    let mut updates: Vec<(&Tracker, DateTime<Utc>, SeenIds)> = Vec::new();

    for tracker in &snapshot {
        match poll_tracker(state, tracker).await {
            PollOutcome::Unresolved => report.unresolved += 1,
            PollOutcome::FetchFailed => report.fetch_failed += 1,
            PollOutcome::Polled {
                checked_at,
                seen,
                new_items,
                notify_failed,
            } => {
                report.polled += 1;
                report.new_items += new_items;
                report.notify_failed += notify_failed;
                updates.push((tracker, checked_at, seen));
            }
        }
    }

    {
        let mut set = state.trackers.lock().await;
        for (polled, at, seen) in updates {
            // Removed mid-sweep: stays removed. Removed and re-added: the new
            // tracker keeps its own baseline.
            match set.get_mut(&polled.key()) {
                Some(t) if *t == *polled => t.record_poll(at, seen),
                Some(_) => tracing::debug!(
                    target: "scheduler",
                    query = polled.query(),
                    channel = %polled.destination(),
                    "tracker replaced during sweep, dropping stale result"
                ),
                None => {}
            }
        }
        match state.store.save_all(set.as_slice()) {
            Ok(()) => report.persisted = true,
            Err(e) => tracing::error!(
                target: "scheduler",
                error = %e,
                "could not persist trackers; a restart may re-announce items"
            ),
        }
        gauge!("trackers_active").set(set.len() as f64);
    }

    counter!("tracker_sweeps_total").increment(1);
    gauge!("tracker_last_sweep_ts").set(Utc::now().timestamp() as f64);
    tracing::info!(
        target: "scheduler",
        polled = report.polled,
        unresolved = report.unresolved,
        fetch_failed = report.fetch_failed,
        new_items = report.new_items,
        notify_failed = report.notify_failed,
        persisted = report.persisted,
        "sweep finished"
    );
    report
}

/// Run sweeps every `settings.interval` until `shutdown` is cancelled.
///
/// The first sweep starts immediately. Cancellation is only observed between
/// sweeps; a running sweep always reaches its `save_all`.
pub fn spawn_poll_loop(state: Arc<SchedulerState>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "scheduler", "poll loop stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }
            run_sweep(&state).await;
        }
    })
}
