//! Settings Routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use settings::{Settings, SettingsPatch};

use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub settings: Settings,
    /// Fields that failed validation and were left unchanged
    pub rejected: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrateRequest {
    pub actual_distance_cm: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrateResponse {
    pub calibration_factor: f64,
    pub settings: Settings,
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.session.snapshot().settings)
}

/// Merge a partial settings document. Fields of the wrong type are
/// dropped rather than failing the request.
pub async fn put_settings(
    State(state): State<AppState>,
    Json(document): Json<Value>,
) -> ApiResult<Json<UpdateResponse>> {
    let patch = SettingsPatch::from_document(&document);
    let rejected = state.session.update_settings(patch).await?;
    Ok(Json(UpdateResponse {
        settings: state.session.snapshot().settings,
        rejected,
    }))
}

/// Calibrate against the last measured face distance
pub async fn calibrate(
    State(state): State<AppState>,
    Json(request): Json<CalibrateRequest>,
) -> ApiResult<Json<CalibrateResponse>> {
    let calibration_factor = state.session.calibrate(request.actual_distance_cm).await?;
    Ok(Json(CalibrateResponse {
        calibration_factor,
        settings: state.session.snapshot().settings,
    }))
}

pub async fn reset_calibration(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    state.session.reset_calibration().await?;
    Ok(Json(state.session.snapshot().settings))
}
