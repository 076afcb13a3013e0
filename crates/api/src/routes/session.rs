//! Session Routes

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use session::{SessionSnapshot, SessionStats, SessionSummary, Started};

use crate::{ApiError, ApiResult, AppState};

/// Response for the stop endpoint
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// Whether a running session was ended by this call
    pub stopped: bool,
    pub summary: Option<SessionSummary>,
}

/// Current session snapshot
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

pub async fn start_session(State(state): State<AppState>) -> ApiResult<Json<Started>> {
    Ok(Json(state.session.start().await?))
}

pub async fn stop_session(State(state): State<AppState>) -> ApiResult<Json<StopResponse>> {
    let summary = state.session.stop_and_wait().await?;
    Ok(Json(StopResponse {
        stopped: summary.is_some(),
        summary,
    }))
}

/// Clear statistics and records; returns the cleared statistics
pub async fn reset_stats(State(state): State<AppState>) -> ApiResult<Json<SessionStats>> {
    state.session.reset_stats().await?;
    Ok(Json(state.session.snapshot().stats))
}

/// JPEG attached to a violation record, newest record first
pub async fn get_record_snapshot(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state.session.snapshot();
    let record = snapshot
        .records
        .into_iter()
        .nth(index)
        .ok_or_else(|| ApiError::NotFound(format!("no violation record at index {index}")))?;
    let jpeg = record
        .snapshot_jpeg
        .ok_or_else(|| ApiError::NotFound(format!("record {index} has no snapshot")))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg))
}
