//! API error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use posture::MeasurementError;
use serde_json::json;
use session::{DeviceError, SessionError, SnapshotError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Session(e) => match e {
                SessionError::DeviceUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "DEVICE_UNAVAILABLE")
                }
                SessionError::PersistenceFailure(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILURE")
                }
                SessionError::InvalidMeasurement(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_MEASUREMENT")
                }
                SessionError::NotRunning => (StatusCode::CONFLICT, "NOT_RUNNING"),
                SessionError::Calibration(_) => (StatusCode::BAD_REQUEST, "CALIBRATION_FAILED"),
                SessionError::Closed => (StatusCode::SERVICE_UNAVAILABLE, "SESSION_CLOSED"),
            },
            ApiError::Device(e) => match e {
                DeviceError::NotAcquired => (StatusCode::CONFLICT, "NOT_RUNNING"),
                DeviceError::QueueFull => (StatusCode::TOO_MANY_REQUESTS, "QUEUE_FULL"),
                DeviceError::Unavailable(_) | DeviceError::Io { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "DEVICE_UNAVAILABLE")
                }
            },
            ApiError::Measurement(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_MEASUREMENT"),
            ApiError::Snapshot(e) => match e {
                SnapshotError::Image(_) => (StatusCode::BAD_REQUEST, "INVALID_IMAGE"),
                SnapshotError::NoSource | SnapshotError::Capture(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CAPTURE_FAILED")
                }
            },
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        };

        if status.is_server_error() {
            tracing::warn!(code, "Request failed: {}", self);
        }
        let body = json!({ "error": { "code": code, "message": self.to_string() } });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
