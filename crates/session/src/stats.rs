//! Per-session statistics and violation records

use chrono::{DateTime, Utc};
use posture::ViolationKind;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Violation records kept per session
pub const RECORD_CAPACITY: usize = 3;

/// Counters and extrema for the running session. Reset at every start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub tilt_violation_count: u32,
    pub distance_violation_count: u32,
    /// Largest absolute tilt seen while in bad posture
    pub max_tilt_observed: f64,
    /// Smallest distance seen while too close; infinite (null) until then
    #[serde(
        serialize_with = "finite_or_null",
        deserialize_with = "null_as_infinity"
    )]
    pub min_distance_observed: f64,
    pub frames_processed: u64,
    pub invalid_frames: u64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            tilt_violation_count: 0,
            distance_violation_count: 0,
            max_tilt_observed: 0.0,
            min_distance_observed: f64::INFINITY,
            frames_processed: 0,
            invalid_frames: 0,
            started_at: None,
        }
    }
}

impl SessionStats {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(at),
            ..Default::default()
        }
    }

    /// Update extrema from a violating frame
    pub fn observe(&mut self, kind: ViolationKind, distance_cm: f64, tilt_deg: f64) {
        match kind {
            ViolationKind::Distance => {
                self.min_distance_observed = self.min_distance_observed.min(distance_cm);
            }
            ViolationKind::Posture => {
                self.max_tilt_observed = self.max_tilt_observed.max(tilt_deg.abs());
            }
        }
    }

    /// Count a captured violation event
    pub fn count(&mut self, kind: ViolationKind) {
        match kind {
            ViolationKind::Distance => self.distance_violation_count += 1,
            ViolationKind::Posture => self.tilt_violation_count += 1,
        }
    }

    pub fn total_violations(&self) -> u32 {
        self.tilt_violation_count + self.distance_violation_count
    }
}

fn finite_or_null<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_some(value)
    } else {
        serializer.serialize_none()
    }
}

fn null_as_infinity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

/// A captured violation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    pub kind: ViolationKind,
    /// Distance in cm, or absolute tilt in degrees
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub has_snapshot: bool,
    /// JPEG bytes, served separately
    #[serde(skip)]
    pub snapshot_jpeg: Option<Vec<u8>>,
}

impl ViolationRecord {
    pub fn new(
        kind: ViolationKind,
        value: f64,
        timestamp: DateTime<Utc>,
        snapshot_jpeg: Option<Vec<u8>>,
    ) -> Self {
        Self {
            kind,
            value,
            timestamp,
            has_snapshot: snapshot_jpeg.is_some(),
            snapshot_jpeg,
        }
    }
}
