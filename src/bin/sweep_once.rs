//! Runs a single sweep over the configured tracker file and exits.
//!
//! `sweep-once --fixture tiles.json` serves every query from a JSON file of
//! render-service tiles instead of calling the render service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use listing_tracker::config::BotConfig;
use listing_tracker::source::{FixtureSource, ScrapeServiceSource};
use listing_tracker::{build_notifier, build_state, init_tracing, run_sweep, ItemSource};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = BotConfig::load_default().context("loading bot config")?;

    let mut args = std::env::args().skip(1);
    let source: Arc<dyn ItemSource> = match (args.next().as_deref(), args.next()) {
        (Some("--fixture"), Some(path)) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading fixture {path}"))?;
            Arc::new(FixtureSource::from_listings_json(&json, &cfg.marketplace_url()?)?)
        }
        (None, _) => Arc::new(
            ScrapeServiceSource::new(cfg.source_endpoint()?, cfg.marketplace_url()?)
                .with_timeout(Duration::from_secs(cfg.poll.fetch_timeout_secs))
                .context("building render service client")?,
        ),
        _ => bail!("usage: sweep-once [--fixture <tiles.json>]"),
    };

    let notifier = build_notifier(&cfg);
    notifier.ready().await.context("notifier not ready")?;
    let state = build_state(&cfg, source, notifier)?;

    let report = run_sweep(&state).await;
    println!(
        "sweep done: {} trackers, {} polled, {} new, {} fetch failures, {} unresolved, persisted={}",
        report.trackers,
        report.polled,
        report.new_items,
        report.fetch_failed,
        report.unresolved,
        report.persisted
    );
    if !report.persisted {
        bail!("tracker file was not saved");
    }
    Ok(())
}
