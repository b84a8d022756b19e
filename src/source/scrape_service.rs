// src/source/scrape_service.rs
use std::time::Duration;

use async_trait::async_trait;
use metrics::histogram;
use reqwest::Client;
use url::Url;

use super::{FetchError, ItemSource};
use crate::item::{Item, RawListing};

/// Item source backed by an external render service.
///
/// The marketplace renders its result grid client-side, so page rendering is
/// delegated: `GET {endpoint}?url=<query>` answers with a JSON array of
/// [`RawListing`] tiles in page order.
#[derive(Clone)]
pub struct ScrapeServiceSource {
    endpoint: Url,
    marketplace: Url,
    client: Client,
}

impl ScrapeServiceSource {
    pub fn new(endpoint: Url, marketplace: Url) -> Self {
        Self {
            endpoint,
            marketplace,
            client: Client::new(),
        }
    }

    /// Per-request cap. The poll loop applies its own deadline on top.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, FetchError> {
        self.client = Client::builder()
            .user_agent("listing-tracker/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(self)
    }

    pub(crate) fn parse_listings(&self, body: &str) -> Result<Vec<Item>, FetchError> {
        let raw: Vec<RawListing> =
            serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(raw
            .into_iter()
            .filter_map(|r| r.into_item(&self.marketplace))
            .collect())
    }
}

#[async_trait]
impl ItemSource for ScrapeServiceSource {
    async fn fetch(&self, query: &str) -> Result<Vec<Item>, FetchError> {
        let t0 = std::time::Instant::now();
        let rsp = self
            .client
            .get(self.endpoint.clone())
            .query(&[("url", query)])
            .send()
            .await?;

        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let body = rsp.text().await?;
        let items = self.parse_listings(&body)?;

        histogram!("tracker_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(target: "source", count = items.len(), "render service returned listings");
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "scrape-service"
    }
}
