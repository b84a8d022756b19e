//! Listing tracker binary entrypoint.
//! Loads trackers, starts the admin API, and runs the poll loop once the chat
//! connection is ready.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use listing_tracker::config::BotConfig;
use listing_tracker::metrics::Metrics;
use listing_tracker::source::ScrapeServiceSource;
use listing_tracker::{
    build_notifier, build_state, cancel_on_signal, create_router, init_tracing, spawn_poll_loop,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = BotConfig::load_default().context("loading bot config")?;
    let metrics = Metrics::init().context("installing prometheus recorder")?;

    let source = Arc::new(
        ScrapeServiceSource::new(cfg.source_endpoint()?, cfg.marketplace_url()?)
            .with_timeout(Duration::from_secs(cfg.poll.fetch_timeout_secs))
            .context("building render service client")?,
    );
    let notifier = build_notifier(&cfg);
    let state = Arc::new(build_state(&cfg, source, notifier.clone())?);

    let addr = cfg.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding admin API on {addr}"))?;
    tracing::info!(%addr, "admin API listening");

    notifier
        .ready()
        .await
        .with_context(|| format!("{} notifier not ready", notifier.name()))?;
    tracing::info!(notifier = notifier.name(), "notifier ready, starting poll loop");

    let shutdown = CancellationToken::new();
    let poller = spawn_poll_loop(state.clone(), shutdown.clone());

    let router = create_router(state).merge(metrics.router());
    axum::serve(listener, router)
        .with_graceful_shutdown(cancel_on_signal(
            tokio::signal::ctrl_c(),
            shutdown.clone(),
        ))
        .await
        .context("admin API server")?;

    shutdown.cancel();
    // Let an in-flight sweep reach its save.
    let _ = poller.await;
    Ok(())
}
