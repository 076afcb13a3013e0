//! Settings record and validated patching

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::SettingsError;

/// User-facing monitoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Distance at or beyond which the user is rewarded (cm)
    pub ideal_distance_cm: f64,

    /// Distance below which the user is too close (cm)
    pub min_distance_cm: f64,

    /// Minimum spacing between warnings and violation captures (seconds)
    pub warning_interval_sec: f64,

    /// Maximum head roll before posture is flagged (degrees)
    pub max_tilt_deg: f64,

    /// Multiplier applied to raw distance estimates
    pub calibration_factor: f64,

    /// Enable streaks, points and recovery rewards
    pub enable_positive_reward: bool,

    /// Whether `calibration_factor` came from a calibration run
    pub is_calibrated: bool,

    /// Continuous absence after which a session ends itself (minutes)
    pub away_timeout_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ideal_distance_cm: 50.0,
            min_distance_cm: 35.0,
            warning_interval_sec: 5.0,
            max_tilt_deg: 15.0,
            calibration_factor: 1.0,
            enable_positive_reward: true,
            is_calibrated: false,
            away_timeout_minutes: 5,
        }
    }
}

/// Partial settings update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub ideal_distance_cm: Option<f64>,
    pub min_distance_cm: Option<f64>,
    pub warning_interval_sec: Option<f64>,
    pub max_tilt_deg: Option<f64>,
    pub calibration_factor: Option<f64>,
    pub enable_positive_reward: Option<bool>,
    pub is_calibrated: Option<bool>,
    pub away_timeout_minutes: Option<u32>,
}

fn field<'a>(doc: &'a Value, key: &str, legacy: Option<&str>) -> Option<&'a Value> {
    doc.get(key)
        .or_else(|| legacy.and_then(|legacy| doc.get(legacy)))
}

fn number_field(doc: &Value, key: &'static str, legacy: Option<&str>) -> Option<f64> {
    let value = field(doc, key, legacy)?;
    match value.as_f64() {
        Some(n) => Some(n),
        None => {
            warn!(field = key, %value, "ignoring non-numeric settings field");
            None
        }
    }
}

fn bool_field(doc: &Value, key: &'static str) -> Option<bool> {
    let value = field(doc, key, None)?;
    match value.as_bool() {
        Some(b) => Some(b),
        None => {
            warn!(field = key, %value, "ignoring non-boolean settings field");
            None
        }
    }
}

impl SettingsPatch {
    /// Build a patch from an arbitrary JSON document, dropping fields of the
    /// wrong type. Keys of the older browser schema are accepted too.
    pub fn from_document(doc: &Value) -> Self {
        if !doc.is_object() {
            warn!("settings document is not an object, ignoring it");
            return Self::default();
        }
        let away_timeout_minutes = number_field(doc, "awayTimeoutMinutes", Some("awayTimeout"))
            .filter(|m| m.fract() == 0.0 && *m >= 1.0 && *m <= u32::MAX as f64)
            .map(|m| m as u32);

        Self {
            ideal_distance_cm: number_field(doc, "idealDistanceCm", Some("idealDistance")),
            min_distance_cm: number_field(doc, "minDistanceCm", Some("minDistance")),
            warning_interval_sec: number_field(doc, "warningIntervalSec", Some("warningInterval")),
            max_tilt_deg: number_field(doc, "maxTiltDeg", Some("maxAngle")),
            calibration_factor: number_field(doc, "calibrationFactor", None),
            enable_positive_reward: bool_field(doc, "enablePositiveReward"),
            is_calibrated: bool_field(doc, "isCalibrated"),
            away_timeout_minutes,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Longest accepted warning interval (one day)
pub const MAX_WARNING_INTERVAL_SEC: f64 = 86_400.0;

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl Settings {
    /// Defaults overlaid with every valid field of a stored document
    pub fn from_document(doc: &Value) -> Self {
        let mut settings = Self::default();
        settings.apply(&SettingsPatch::from_document(doc));
        settings
    }

    /// Merge a patch into these settings. Returns the names of the
    /// fields that were rejected.
    pub fn apply(&mut self, patch: &SettingsPatch) -> Vec<&'static str> {
        let mut rejected = Vec::new();

        let mut set_positive =
            |name: &'static str, value: Option<f64>, max: f64, target: &mut f64| {
                if let Some(value) = value {
                    if positive(value) && value <= max {
                        *target = value;
                    } else {
                        warn!(field = name, value, "ignoring invalid settings value");
                        rejected.push(name);
                    }
                }
            };

        set_positive(
            "idealDistanceCm",
            patch.ideal_distance_cm,
            f64::MAX,
            &mut self.ideal_distance_cm,
        );
        set_positive(
            "minDistanceCm",
            patch.min_distance_cm,
            f64::MAX,
            &mut self.min_distance_cm,
        );
        set_positive(
            "warningIntervalSec",
            patch.warning_interval_sec,
            MAX_WARNING_INTERVAL_SEC,
            &mut self.warning_interval_sec,
        );
        set_positive(
            "maxTiltDeg",
            patch.max_tilt_deg,
            f64::MAX,
            &mut self.max_tilt_deg,
        );
        set_positive(
            "calibrationFactor",
            patch.calibration_factor,
            f64::MAX,
            &mut self.calibration_factor,
        );

        if let Some(enabled) = patch.enable_positive_reward {
            self.enable_positive_reward = enabled;
        }
        if let Some(calibrated) = patch.is_calibrated {
            self.is_calibrated = calibrated;
        }
        match patch.away_timeout_minutes {
            Some(0) => {
                warn!(field = "awayTimeoutMinutes", "ignoring zero away timeout");
                rejected.push("awayTimeoutMinutes");
            }
            Some(minutes) => self.away_timeout_minutes = minutes,
            None => {}
        }

        if self.min_distance_cm >= self.ideal_distance_cm {
            // Allowed, but the "normal" band disappears.
            warn!(
                min = self.min_distance_cm,
                ideal = self.ideal_distance_cm,
                "minimum distance is not below the ideal distance"
            );
        }

        rejected
    }

    /// Out-of-range values (only reachable by building `Settings`
    /// directly) saturate instead of panicking.
    pub fn warning_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.warning_interval_sec.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn away_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.away_timeout_minutes) * 60)
    }

    /// Derive a calibration factor so that `raw_distance_cm` reads as
    /// `actual_distance_cm`.
    pub fn calibrate(
        &mut self,
        actual_distance_cm: f64,
        raw_distance_cm: f64,
    ) -> Result<f64, SettingsError> {
        if !positive(actual_distance_cm) {
            return Err(SettingsError::Calibration(format!(
                "actual distance must be positive, got {actual_distance_cm}"
            )));
        }
        if !positive(raw_distance_cm) {
            return Err(SettingsError::Calibration(
                "no face measured yet".to_string(),
            ));
        }
        self.calibration_factor = actual_distance_cm / raw_distance_cm;
        self.is_calibrated = true;
        Ok(self.calibration_factor)
    }

    pub fn reset_calibration(&mut self) {
        self.calibration_factor = 1.0;
        self.is_calibrated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.ideal_distance_cm, 50.0);
        assert_eq!(s.min_distance_cm, 35.0);
        assert_eq!(s.warning_interval(), Duration::from_secs(5));
        assert_eq!(s.away_timeout(), Duration::from_secs(300));
        assert!(s.enable_positive_reward);
        assert!(!s.is_calibrated);
    }

    #[test]
    fn test_invalid_fields_ignored_individually() {
        let mut s = Settings::default();
        let rejected = s.apply(&SettingsPatch {
            ideal_distance_cm: Some(60.0),
            min_distance_cm: Some(-3.0),
            max_tilt_deg: Some(f64::NAN),
            enable_positive_reward: Some(false),
            ..Default::default()
        });

        assert_eq!(s.ideal_distance_cm, 60.0);
        assert_eq!(s.min_distance_cm, 35.0);
        assert_eq!(s.max_tilt_deg, 15.0);
        assert!(!s.enable_positive_reward);
        assert_eq!(rejected, vec!["minDistanceCm", "maxTiltDeg"]);
    }

    #[test]
    fn test_from_document_lenient() {
        let doc = json!({
            "idealDistanceCm": 55,
            "minDistanceCm": "close",
            "warningIntervalSec": 0,
            "enablePositiveReward": "yes",
            "isCalibrated": true,
            "unknown": 1
        });
        let s = Settings::from_document(&doc);
        assert_eq!(s.ideal_distance_cm, 55.0);
        assert_eq!(s.min_distance_cm, 35.0);
        assert_eq!(s.warning_interval_sec, 5.0);
        assert!(s.enable_positive_reward);
        assert!(s.is_calibrated);
    }

    #[test]
    fn test_from_document_legacy_keys() {
        let doc = json!({
            "idealDistance": 45,
            "minDistance": 30,
            "warningInterval": 8,
            "maxAngle": 20,
            "awayTimeout": 10
        });
        let s = Settings::from_document(&doc);
        assert_eq!(s.ideal_distance_cm, 45.0);
        assert_eq!(s.min_distance_cm, 30.0);
        assert_eq!(s.warning_interval_sec, 8.0);
        assert_eq!(s.max_tilt_deg, 20.0);
        assert_eq!(s.away_timeout_minutes, 10);
    }

    #[test]
    fn test_non_object_document_gives_defaults() {
        assert_eq!(Settings::from_document(&json!([1, 2])), Settings::default());
        assert_eq!(Settings::from_document(&json!(null)), Settings::default());
    }

    #[test]
    fn test_huge_warning_interval_rejected() {
        let mut s = Settings::default();
        let rejected = s.apply(&SettingsPatch {
            warning_interval_sec: Some(1e20),
            ..Default::default()
        });
        assert_eq!(rejected, vec!["warningIntervalSec"]);
        assert_eq!(s.warning_interval(), Duration::from_secs(5));

        let patch = SettingsPatch::from_document(&json!({"warningIntervalSec": 86_400}));
        let rejected = s.apply(&patch);
        assert!(rejected.is_empty());
        assert_eq!(s.warning_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_stored_huge_warning_interval_falls_back() {
        let s = Settings::from_document(&json!({"warningIntervalSec": 1e20, "maxTiltDeg": 12}));
        assert_eq!(s.warning_interval_sec, 5.0);
        assert_eq!(s.max_tilt_deg, 12.0);
    }

    #[test]
    fn test_warning_interval_saturates() {
        let s = Settings {
            warning_interval_sec: 1e20,
            ..Default::default()
        };
        assert_eq!(s.warning_interval(), Duration::MAX);

        let s = Settings {
            warning_interval_sec: f64::NAN,
            ..Default::default()
        };
        assert_eq!(s.warning_interval(), Duration::ZERO);
    }

    #[test]
    fn test_zero_away_timeout_rejected() {
        let mut s = Settings::default();
        let rejected = s.apply(&SettingsPatch {
            away_timeout_minutes: Some(0),
            ..Default::default()
        });
        assert_eq!(s.away_timeout_minutes, 5);
        assert_eq!(rejected, vec!["awayTimeoutMinutes"]);
    }

    #[test]
    fn test_calibration() {
        let mut s = Settings::default();
        let factor = s.calibrate(60.0, 48.0).unwrap();
        assert!((factor - 1.25).abs() < 1e-9);
        assert!(s.is_calibrated);

        assert!(s.calibrate(60.0, 0.0).is_err());
        assert!(s.calibrate(-1.0, 40.0).is_err());
        assert!((s.calibration_factor - 1.25).abs() < 1e-9);

        s.reset_calibration();
        assert_eq!(s.calibration_factor, 1.0);
        assert!(!s.is_calibrated);
    }
}
