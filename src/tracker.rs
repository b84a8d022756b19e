// src/tracker.rs
//! Tracker records and the in-memory working set.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::item::Item;

/// Chat channel a tracker reports into (Discord snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ChannelId)
    }
}

// Snowflakes overflow JS numbers, so they travel as strings.
impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Item ids seen on the most recent successful fetch.
///
/// Semantically a set; the fetched order is kept so the persisted file is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SeenIds(Vec<String>);

pub const SEEN_IDS_DELIMITER: char = '|';

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of `items`, duplicates dropped, first occurrence wins.
    pub fn from_items(items: &[Item]) -> Self {
        items.iter().map(|it| it.id.clone()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|s| s == id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Order-insensitive comparison.
    pub fn same_set(&self, other: &SeenIds) -> bool {
        let a: HashSet<&str> = self.iter().collect();
        let b: HashSet<&str> = other.iter().collect();
        a == b
    }

    /// `|`-joined; empty set encodes as the empty string.
    pub fn encode(&self) -> String {
        self.0.join(&SEEN_IDS_DELIMITER.to_string())
    }

    pub fn decode(s: &str) -> Self {
        s.split(SEEN_IDS_DELIMITER)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<String> for SeenIds {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in iter {
            if seen.insert(id.clone()) {
                out.push(id);
            }
        }
        SeenIds(out)
    }
}

/// Identity of a tracker: no two trackers share the same pair.
pub type TrackerKey = (String, ChannelId);

/// One watched search query bound to one destination channel.
///
/// `query` and `destination` are fixed at creation; only the poll state
/// (`last_checked_at`, `seen`) changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tracker {
    query: String,
    destination: ChannelId,
    last_checked_at: DateTime<Utc>,
    seen: SeenIds,
}

impl Tracker {
    pub fn new(
        query: impl Into<String>,
        destination: ChannelId,
        last_checked_at: DateTime<Utc>,
        seen: SeenIds,
    ) -> Self {
        Self {
            query: query.into(),
            destination,
            last_checked_at,
            seen,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn destination(&self) -> ChannelId {
        self.destination
    }

    pub fn last_checked_at(&self) -> DateTime<Utc> {
        self.last_checked_at
    }

    pub fn seen(&self) -> &SeenIds {
        &self.seen
    }

    pub fn key(&self) -> TrackerKey {
        (self.query.clone(), self.destination)
    }

    pub fn matches(&self, query: &str, destination: ChannelId) -> bool {
        self.destination == destination && self.query == query
    }

    /// Record a completed poll: the seen set is replaced, never merged.
    pub fn record_poll(&mut self, at: DateTime<Utc>, seen: SeenIds) {
        self.last_checked_at = at;
        self.seen = seen;
    }
}

/// Tried to insert a tracker whose (query, destination) already exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("a tracker for {query} already exists in channel {destination}")]
pub struct DuplicateTracker {
    pub query: String,
    pub destination: ChannelId,
}

/// Filter for listing trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerFilter {
    Destination(ChannelId),
    All,
}

impl TrackerFilter {
    pub fn accepts(&self, t: &Tracker) -> bool {
        match self {
            TrackerFilter::Destination(ch) => t.destination == *ch,
            TrackerFilter::All => true,
        }
    }
}

/// The working list of trackers. Mutations are in-memory only; callers
/// persist through `TrackerStore::save_all` explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerSet {
    items: Vec<Tracker>,
}

impl TrackerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loaded records, rejecting duplicate keys.
    pub fn from_trackers(trackers: Vec<Tracker>) -> Result<Self, DuplicateTracker> {
        let mut set = Self::new();
        for t in trackers {
            set.append(t)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[Tracker] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tracker> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<Tracker> {
        self.items.clone()
    }

    pub fn contains(&self, query: &str, destination: ChannelId) -> bool {
        self.items.iter().any(|t| t.matches(query, destination))
    }

    pub fn get_mut(&mut self, key: &TrackerKey) -> Option<&mut Tracker> {
        self.items.iter_mut().find(|t| t.matches(&key.0, key.1))
    }

    pub fn append(&mut self, tracker: Tracker) -> Result<(), DuplicateTracker> {
        if self.contains(&tracker.query, tracker.destination) {
            return Err(DuplicateTracker {
                query: tracker.query,
                destination: tracker.destination,
            });
        }
        self.items.push(tracker);
        Ok(())
    }

    /// Remove every tracker matching `pred`, returning the removed ones in order.
    pub fn remove_where<F>(&mut self, mut pred: F) -> Vec<Tracker>
    where
        F: FnMut(&Tracker) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.items.len());
        for t in self.items.drain(..) {
            if pred(&t) {
                removed.push(t);
            } else {
                kept.push(t);
            }
        }
        self.items = kept;
        removed
    }

    pub fn filtered(&self, filter: TrackerFilter) -> Vec<Tracker> {
        self.items
            .iter()
            .filter(|t| filter.accepts(t))
            .cloned()
            .collect()
    }
}
