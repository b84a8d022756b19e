// src/admission.rs
//! Tracker creation and removal: thin orchestration over the working set,
//! the store and one baseline fetch.

use url::Url;

use crate::scheduler::{now, SchedulerState};
use crate::source::{fetch_window, FetchError};
use crate::store::PersistenceError;
use crate::tracker::{ChannelId, DuplicateTracker, SeenIds, Tracker, TrackerFilter};

/// Rewritten into every query so the page lists newest listings first.
pub const NEWEST_FIRST: (&str, &str) = ("order", "newest_first");
const ORDER_PARAMS: &[&str] = &["order", "order_by"];

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("query is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("query is not a {expected} link")]
    ForeignMarketplace { expected: String },
    #[error(transparent)]
    Duplicate(#[from] DuplicateTracker),
}

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("baseline fetch failed: {0}")]
    Baseline(#[from] FetchError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// What a remove request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(Vec<Tracker>),
    NotFound,
    /// No query given: the destination's trackers, nothing removed.
    Listed(Vec<Tracker>),
}

/// Check the query belongs to the marketplace and force newest-first ordering.
///
/// Existing `order`/`order_by` parameters are dropped, other parameters keep
/// their relative order, and `order=newest_first` is appended.
pub fn normalize_query(raw: &str, marketplace: &Url) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    let mut url = Url::parse(raw)?;
    if url.scheme() != marketplace.scheme() || url.host_str() != marketplace.host_str() {
        return Err(ValidationError::ForeignMarketplace {
            expected: marketplace.host_str().unwrap_or_default().to_string(),
        });
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !ORDER_PARAMS.contains(&&**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(NEWEST_FIRST.0, NEWEST_FIRST.1);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Create a tracker for `raw_query` in `destination`.
///
/// The current top of the page is recorded as the baseline, so listings that
/// already exist are never announced.
pub async fn create_tracker(
    state: &SchedulerState,
    raw_query: &str,
    destination: ChannelId,
) -> Result<Tracker, AdmissionError> {
    let settings = state.settings();
    let query = normalize_query(raw_query, &settings.marketplace)?;

    let duplicate = || DuplicateTracker {
        query: query.clone(),
        destination,
    };
    if state.trackers.lock().await.contains(&query, destination) {
        return Err(ValidationError::from(duplicate()).into());
    }

    let baseline = fetch_window(
        state.source.as_ref(),
        &query,
        settings.fetch_timeout,
        settings.window,
    )
    .await?;
    let tracker = Tracker::new(
        query.clone(),
        destination,
        now(),
        SeenIds::from_items(&baseline),
    );

    let mut set = state.trackers.lock().await;
    // Re-checked: the lock was released during the baseline fetch.
    set.append(tracker.clone()).map_err(ValidationError::from)?;
    if let Err(e) = state.store.save_all(set.as_slice()) {
        set.remove_where(|t| t.matches(&query, destination));
        return Err(e.into());
    }
    metrics::gauge!("trackers_active").set(set.len() as f64);

    tracing::info!(
        target: "admission",
        query = %query,
        channel = %destination,
        baseline = tracker.seen().len(),
        "tracker created"
    );
    Ok(tracker)
}

/// Remove the tracker for `query` in `destination`, or list the destination's
/// trackers when no query is given.
///
/// The stored query must match exactly, either as typed or in its normalized form.
pub async fn delete_tracker(
    state: &SchedulerState,
    query: Option<&str>,
    destination: ChannelId,
) -> Result<RemoveOutcome, AdmissionError> {
    let Some(raw) = query.map(str::trim).filter(|q| !q.is_empty()) else {
        let listed = list_trackers(state, TrackerFilter::Destination(destination)).await;
        return Ok(RemoveOutcome::Listed(listed));
    };
    let normalized = normalize_query(raw, &state.settings().marketplace).ok();

    let mut set = state.trackers.lock().await;
    let removed = set.remove_where(|t| {
        t.destination() == destination
            && (t.query() == raw || Some(t.query()) == normalized.as_deref())
    });
    if removed.is_empty() {
        return Ok(RemoveOutcome::NotFound);
    }

    if let Err(e) = state.store.save_all(set.as_slice()) {
        for t in removed {
            // Came out of this set a moment ago, cannot collide.
            let _ = set.append(t);
        }
        return Err(e.into());
    }
    metrics::gauge!("trackers_active").set(set.len() as f64);

    tracing::info!(target: "admission", query = raw, channel = %destination, "tracker removed");
    Ok(RemoveOutcome::Removed(removed))
}

pub async fn list_trackers(state: &SchedulerState, filter: TrackerFilter) -> Vec<Tracker> {
    state.trackers.lock().await.filtered(filter)
}
