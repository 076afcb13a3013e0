//! Detector output and the per-frame measurement derived from it

use serde::{Deserialize, Serialize};

use crate::landmarks::{self, FaceGeometry, Landmark};
use crate::MeasurementError;

/// What the external face detector reports for one frame.
///
/// `distance_cm` is the raw, uncalibrated estimate; calibration is applied
/// when the frame becomes a [`FrameMeasurement`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub presence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tilt_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<FaceGeometry>,
}

impl DetectionResult {
    /// No face in frame
    pub fn absent() -> Self {
        Self {
            presence: false,
            distance_cm: None,
            tilt_deg: None,
            geometry: None,
        }
    }

    /// Face in frame at a raw distance and tilt
    pub fn present(distance_cm: f64, tilt_deg: f64) -> Self {
        Self {
            presence: true,
            distance_cm: Some(distance_cm),
            tilt_deg: Some(tilt_deg),
            geometry: None,
        }
    }

    /// Derive a detection from a full face mesh. An empty mesh means no
    /// face was found.
    pub fn from_landmarks(mesh: &[Landmark]) -> Result<Self, MeasurementError> {
        if mesh.is_empty() {
            return Ok(Self::absent());
        }
        Ok(Self {
            presence: true,
            distance_cm: Some(landmarks::raw_distance_cm(mesh)?),
            tilt_deg: Some(landmarks::tilt_degrees(mesh)?),
            geometry: Some(landmarks::face_geometry(mesh)?),
        })
    }
}

/// One frame's measurement, consumed once by the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeasurement {
    /// Calibrated distance, 0 when no face
    pub distance_cm: f64,
    /// Signed head roll
    pub tilt_deg: f64,
    pub presence: bool,
}

impl FrameMeasurement {
    pub fn absent() -> Self {
        Self::default()
    }

    /// Validate a detection and apply the calibration factor.
    pub fn from_detection(
        detection: &DetectionResult,
        calibration_factor: f64,
    ) -> Result<Self, MeasurementError> {
        if !detection.presence {
            return Ok(Self::absent());
        }

        let distance = detection
            .distance_cm
            .ok_or(MeasurementError::Missing { field: "distanceCm" })?;
        let tilt = detection
            .tilt_deg
            .ok_or(MeasurementError::Missing { field: "tiltDeg" })?;

        if !distance.is_finite() {
            return Err(MeasurementError::NonFinite { field: "distanceCm" });
        }
        if !tilt.is_finite() {
            return Err(MeasurementError::NonFinite { field: "tiltDeg" });
        }
        if distance < 0.0 {
            return Err(MeasurementError::Negative {
                field: "distanceCm",
                value: distance,
            });
        }

        Ok(Self {
            distance_cm: distance * calibration_factor,
            tilt_deg: tilt,
            presence: true,
        })
    }
}
