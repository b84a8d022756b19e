// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use listing_tracker::notify::{Notifier, NotifyError};
use listing_tracker::source::FixtureSource;
use listing_tracker::store::TrackerStore;
use listing_tracker::tracker::SeenIds;
use listing_tracker::{ChannelId, Item, PollSettings, SchedulerState, Tracker, TrackerSet};
use url::Url;

pub const MARKET: &str = "https://www.vinted.es/";

pub fn item(id: &str) -> Item {
    Item::new(
        format!("listing {id}"),
        "10,00 €",
        format!("https://img.test/{id}.webp"),
        format!("https://www.vinted.es/items/{id}?referrer=catalog"),
    )
    .expect("valid item url")
}

pub fn items(ids: &[&str]) -> Vec<Item> {
    ids.iter().map(|id| item(id)).collect()
}

pub fn tracker(query: &str, channel: u64, seen: &str) -> Tracker {
    Tracker::new(
        query,
        ChannelId(channel),
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        SeenIds::decode(seen),
    )
}

pub fn settings() -> PollSettings {
    let mut s = PollSettings::new(Url::parse(MARKET).unwrap());
    s.fetch_timeout = Duration::from_secs(5);
    s
}

/// Records every announcement; channels can be made unknown or failing.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(ChannelId, String)>>,
    pub unknown: Mutex<HashSet<ChannelId>>,
    pub failing: Mutex<HashSet<ChannelId>>,
}

impl RecordingNotifier {
    pub fn sent_ids(&self, channel: u64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == ChannelId(channel))
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn forget(&self, channel: u64) {
        self.unknown.lock().unwrap().insert(ChannelId(channel));
    }

    pub fn fail(&self, channel: u64) {
        self.failing.lock().unwrap().insert(ChannelId(channel));
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn resolve(&self, destination: ChannelId) -> bool {
        !self.unknown.lock().unwrap().contains(&destination)
    }

    async fn notify(&self, destination: ChannelId, item: &Item) -> Result<(), NotifyError> {
        if self.failing.lock().unwrap().contains(&destination) {
            return Err(NotifyError::Status {
                status: 403,
                body: "Missing Access".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination, item.id.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct Harness {
    pub state: Arc<SchedulerState>,
    pub source: Arc<FixtureSource>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness_with(dir: &Path, trackers: Vec<Tracker>, settings: PollSettings) -> Harness {
    let source = Arc::new(FixtureSource::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let state = Arc::new(SchedulerState::new(
        TrackerSet::from_trackers(trackers).unwrap(),
        TrackerStore::new(dir.join("trackers.csv")),
        source.clone(),
        notifier.clone(),
        settings,
    ));
    Harness {
        state,
        source,
        notifier,
    }
}

pub fn harness(dir: &Path, trackers: Vec<Tracker>) -> Harness {
    harness_with(dir, trackers, settings())
}
