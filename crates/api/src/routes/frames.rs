//! Detection intake

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use posture::{DetectionResult, Landmark};
use serde::{Deserialize, Serialize};

use crate::{ApiError, ApiResult, AppState};

/// Either a raw face mesh or an already reduced detection
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FramePayload {
    Landmarks { landmarks: Vec<Landmark> },
    Detection(DetectionResult),
}

/// Queue one detection for the running session
pub async fn post_frame(
    State(state): State<AppState>,
    Json(payload): Json<FramePayload>,
) -> ApiResult<StatusCode> {
    let frames = state.frames.as_ref().ok_or_else(|| {
        ApiError::Conflict("detections are replayed from a file, intake is disabled".into())
    })?;

    let detection = match payload {
        FramePayload::Landmarks { landmarks } => DetectionResult::from_landmarks(&landmarks)?,
        FramePayload::Detection(detection) => detection,
    };
    frames.push(detection)?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize)]
pub struct CameraFrameResponse {
    pub width: u32,
    pub height: u32,
}

/// Replace the camera frame used for violation snapshots. The body is an
/// encoded image (JPEG or PNG).
pub async fn put_camera_frame(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<CameraFrameResponse>> {
    let (width, height) = state.camera.update_encoded(&body)?;
    Ok(Json(CameraFrameResponse { width, height }))
}
