// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics before first use).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("tracker_sweeps_total", "Completed poll sweeps.");
        describe_counter!(
            "tracker_fetch_errors_total",
            "Tracker fetches that failed, timed out or returned an empty page."
        );
        describe_counter!(
            "tracker_unresolved_total",
            "Trackers skipped because their channel could not be resolved."
        );
        describe_counter!("tracker_new_items_total", "New listings announced.");
        describe_counter!(
            "tracker_notify_errors_total",
            "Announcements the chat API rejected."
        );
        describe_counter!("tracker_store_saves_total", "Successful tracker file rewrites.");
        describe_counter!(
            "tracker_store_save_errors_total",
            "Failed tracker file rewrites."
        );
        describe_histogram!("tracker_fetch_ms", "Render service fetch time in milliseconds.");
        describe_gauge!("tracker_last_sweep_ts", "Unix ts when the last sweep finished.");
        describe_gauge!("trackers_active", "Trackers currently registered.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
