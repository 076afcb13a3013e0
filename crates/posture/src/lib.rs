//! Posture & Distance Analysis
//!
//! Turns per-frame face detections into measurements and classifies them:
//! - Viewing distance from the pupil span of the face mesh
//! - Head roll (tilt) from the eye line
//! - Too-close / bad-posture / ideal-distance classification
//! - Overlay hints for whoever draws the video canvas

pub mod cadence;
pub mod classifier;
pub mod landmarks;
pub mod measurement;
pub mod overlay;

pub use cadence::{FrameCadence, NOMINAL_TICK};
pub use classifier::{classify, Classification, IndicatorStatus, ViolationKind};
pub use landmarks::{FaceBox, FaceGeometry, Landmark, Point};
pub use measurement::{DetectionResult, FrameMeasurement};
pub use overlay::RenderHints;

use thiserror::Error;

/// Malformed frame data. The frame is dropped, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} missing while a face is present")]
    Missing { field: &'static str },

    #[error("{field} is negative ({value})")]
    Negative { field: &'static str, value: f64 },

    #[error("Face mesh has {got} landmarks, need at least {needed}")]
    TooFewLandmarks { got: usize, needed: usize },

    #[error("Pupil landmarks coincide, distance is undefined")]
    DegeneratePupils,
}
