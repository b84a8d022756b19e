// src/source/mod.rs
pub mod fixture;
pub mod scrape_service;

use std::time::Duration;

use async_trait::async_trait;

use crate::item::Item;

pub use fixture::FixtureSource;
pub use scrape_service::ScrapeServiceSource;

/// Any reason a query could not produce items this cycle.
/// Callers treat every variant the same way: skip and retry next sweep.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("render service answered HTTP {status}")]
    Status { status: u16 },
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not decode listings: {0}")]
    Decode(String),
    #[error("search page returned no listings")]
    Empty,
}

/// Capability: given a query URL, return the currently listed items,
/// newest first, as the marketplace orders them.
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<Vec<Item>, FetchError>;
    fn name(&self) -> &'static str;
}

/// Fetch with a deadline and keep only the `window` most recent items.
pub async fn fetch_window(
    source: &dyn ItemSource,
    query: &str,
    timeout: Duration,
    window: usize,
) -> Result<Vec<Item>, FetchError> {
    let mut items = tokio::time::timeout(timeout, source.fetch(query))
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;
    items.truncate(window);
    Ok(items)
}
