// src/api.rs
//! Admin HTTP surface: the add / remove / list commands as JSON endpoints,
//! so any chat frontend can drive tracker admission.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::admission::{self, AdmissionError, RemoveOutcome, ValidationError};
use crate::scheduler::SchedulerState;
use crate::tracker::{ChannelId, Tracker, TrackerFilter};

pub type AppState = Arc<SchedulerState>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/trackers", get(list_all))
        .route(
            "/channels/{channel}/trackers",
            get(list_channel).post(add).delete(remove),
        )
        .with_state(state)
}

#[derive(Deserialize)]
struct AddReq {
    query: String,
}

#[derive(Deserialize)]
struct RemoveParams {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Serialize)]
struct TrackerList {
    trackers: Vec<Tracker>,
}

#[derive(Serialize)]
struct Removed {
    removed: Vec<Tracker>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        let status = match &e {
            AdmissionError::Validation(ValidationError::Duplicate(_)) => StatusCode::CONFLICT,
            AdmissionError::Validation(_) => StatusCode::BAD_REQUEST,
            AdmissionError::Baseline(_) => StatusCode::BAD_GATEWAY,
            AdmissionError::Persistence(_) => {
                tracing::error!(target: "admission", error = %e, "tracker file write failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError(status, e.to_string())
    }
}

async fn list_all(State(state): State<AppState>) -> Json<TrackerList> {
    Json(TrackerList {
        trackers: admission::list_trackers(&state, TrackerFilter::All).await,
    })
}

async fn list_channel(
    State(state): State<AppState>,
    Path(channel): Path<u64>,
) -> Json<TrackerList> {
    let filter = TrackerFilter::Destination(ChannelId(channel));
    Json(TrackerList {
        trackers: admission::list_trackers(&state, filter).await,
    })
}

async fn add(
    State(state): State<AppState>,
    Path(channel): Path<u64>,
    Json(body): Json<AddReq>,
) -> Result<(StatusCode, Json<Tracker>), ApiError> {
    let tracker = admission::create_tracker(&state, &body.query, ChannelId(channel)).await?;
    Ok((StatusCode::CREATED, Json(tracker)))
}

async fn remove(
    State(state): State<AppState>,
    Path(channel): Path<u64>,
    Query(params): Query<RemoveParams>,
) -> Result<Response, ApiError> {
    let outcome =
        admission::delete_tracker(&state, params.query.as_deref(), ChannelId(channel)).await?;
    Ok(match outcome {
        RemoveOutcome::Removed(removed) => Json(Removed { removed }).into_response(),
        RemoveOutcome::Listed(trackers) => Json(TrackerList { trackers }).into_response(),
        RemoveOutcome::NotFound => ApiError(
            StatusCode::NOT_FOUND,
            "no tracker for that query in this channel".to_string(),
        )
        .into_response(),
    })
}
