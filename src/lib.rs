// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod admission;
pub mod api;
pub mod config;
pub mod diff;
pub mod item;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod tracker;

// ---- Re-exports for stable public API ----
pub use crate::admission::{create_tracker, delete_tracker, list_trackers, RemoveOutcome};
pub use crate::api::create_router;
pub use crate::item::Item;
pub use crate::notify::{LogNotifier, Notifier};
pub use crate::scheduler::{run_sweep, spawn_poll_loop, PollSettings, SchedulerState, SweepReport};
pub use crate::source::ItemSource;
pub use crate::store::TrackerStore;
pub use crate::tracker::{ChannelId, Tracker, TrackerFilter, TrackerSet};

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::BotConfig;
use crate::notify::DiscordNotifier;

/// Install the global subscriber. `RUST_LOG` filters, `LOG_FORMAT=json`
/// switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("listing_tracker=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

/// Discord when a bot token is present, otherwise log-only delivery.
pub fn build_notifier(cfg: &BotConfig) -> Arc<dyn Notifier> {
    match BotConfig::discord_token() {
        Some(token) => Arc::new(
            DiscordNotifier::new(token)
                .with_api_base(cfg.discord.api_base.clone())
                .with_timeout(cfg.discord.request_timeout_secs),
        ),
        None => {
            tracing::warn!(
                "{} not set; announcements will only be logged",
                config::ENV_DISCORD_TOKEN
            );
            Arc::new(LogNotifier)
        }
    }
}

/// Load the tracker file and wire the engine. A malformed tracker file is
/// fatal: running with a silently empty set would drop every subscription.
pub fn build_state(
    cfg: &BotConfig,
    source: Arc<dyn ItemSource>,
    notifier: Arc<dyn Notifier>,
) -> Result<SchedulerState> {
    let store = TrackerStore::new(cfg.store.trackers_file.clone());
    let trackers = store.load().context("loading tracker file")?;
    let set = TrackerSet::from_trackers(trackers)?;
    Ok(SchedulerState::new(
        set,
        store,
        source,
        notifier,
        cfg.poll_settings()?,
    ))
}

/// Wait for `signal`, then cancel `shutdown`.
///
/// A listener that could not be installed counts as a shutdown request, but
/// the error is logged first.
pub async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => tracing::error!(error = %e, "could not listen for shutdown signal, stopping"),
    }
    shutdown.cancel();
}
