// src/source/fixture.rs
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use super::{FetchError, ItemSource};
use crate::item::{Item, RawListing};

#[derive(Debug, Clone, Default)]
struct Script {
    items: Vec<Item>,
    failing: bool,
    hanging: bool,
}

/// In-memory item source for tests and dry runs.
///
/// Each query can be given items, made to fail (HTTP 503), or made to never
/// answer. Unknown queries fall back to the default items, if any, else an
/// empty page.
#[derive(Debug, Default)]
pub struct FixtureSource {
    scripts: Mutex<HashMap<String, Script>>,
    default_items: Vec<Item>,
    calls: Mutex<Vec<String>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the same tiles for every query, parsed like render-service output.
    pub fn from_listings_json(json: &str, marketplace: &Url) -> Result<Self, FetchError> {
        let raw: Vec<RawListing> =
            serde_json::from_str(json).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(Self {
            default_items: raw
                .into_iter()
                .filter_map(|r| r.into_item(marketplace))
                .collect(),
            ..Self::default()
        })
    }

    pub fn with_items(self, query: &str, items: Vec<Item>) -> Self {
        self.set_items(query, items);
        self
    }

    pub fn set_items(&self, query: &str, items: Vec<Item>) {
        let mut scripts = self.scripts.lock().expect("fixture mutex poisoned");
        let s = scripts.entry(query.to_string()).or_default();
        s.items = items;
        s.failing = false;
        s.hanging = false;
    }

    pub fn set_failing(&self, query: &str, failing: bool) {
        let mut scripts = self.scripts.lock().expect("fixture mutex poisoned");
        scripts.entry(query.to_string()).or_default().failing = failing;
    }

    pub fn set_hanging(&self, query: &str, hanging: bool) {
        let mut scripts = self.scripts.lock().expect("fixture mutex poisoned");
        scripts.entry(query.to_string()).or_default().hanging = hanging;
    }

    /// Queries fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("fixture mutex poisoned").clone()
    }
}

#[async_trait]
impl ItemSource for FixtureSource {
    async fn fetch(&self, query: &str) -> Result<Vec<Item>, FetchError> {
        self.calls
            .lock()
            .expect("fixture mutex poisoned")
            .push(query.to_string());

        let script = self
            .scripts
            .lock()
            .expect("fixture mutex poisoned")
            .get(query)
            .cloned();

        match script {
            Some(s) if s.hanging => {
                std::future::pending::<()>().await;
                Err(FetchError::Empty)
            }
            Some(s) if s.failing => Err(FetchError::Status { status: 503 }),
            Some(s) => Ok(s.items),
            None => Ok(self.default_items.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
