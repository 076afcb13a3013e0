//! Per-frame violation classification

use serde::{Deserialize, Serialize};
use settings::Settings;

use crate::FrameMeasurement;

/// Violation kinds tracked by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    /// Face closer than the minimum distance
    Distance,
    /// Head tilted beyond the maximum angle
    Posture,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Distance => "distance",
            ViolationKind::Posture => "posture",
        }
    }
}

/// Indicator state for the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorStatus {
    #[default]
    Normal,
    Warning,
    Ideal,
}

/// Classification of one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub too_close: bool,
    pub bad_posture: bool,
    pub at_ideal: bool,
}

/// Classify a measurement against the thresholds. Pure.
pub fn classify(measurement: &FrameMeasurement, settings: &Settings) -> Classification {
    let distance = measurement.distance_cm;
    let has_distance = distance > 0.0;

    Classification {
        too_close: has_distance && distance < settings.min_distance_cm,
        bad_posture: measurement.tilt_deg.abs() > settings.max_tilt_deg,
        at_ideal: has_distance && distance >= settings.ideal_distance_cm,
    }
}

impl Classification {
    pub fn is_violating(&self) -> bool {
        self.too_close || self.bad_posture
    }

    /// The violation a single warning should talk about; distance wins.
    pub fn primary_violation(&self) -> Option<ViolationKind> {
        if self.too_close {
            Some(ViolationKind::Distance)
        } else if self.bad_posture {
            Some(ViolationKind::Posture)
        } else {
            None
        }
    }

    /// All violation kinds present in this frame
    pub fn violations(&self) -> impl Iterator<Item = ViolationKind> {
        let distance = self.too_close.then_some(ViolationKind::Distance);
        let posture = self.bad_posture.then_some(ViolationKind::Posture);
        distance.into_iter().chain(posture)
    }

    pub fn distance_status(&self) -> IndicatorStatus {
        if self.too_close {
            IndicatorStatus::Warning
        } else if self.at_ideal {
            IndicatorStatus::Ideal
        } else {
            IndicatorStatus::Normal
        }
    }

    pub fn posture_status(&self) -> IndicatorStatus {
        if self.bad_posture {
            IndicatorStatus::Warning
        } else {
            IndicatorStatus::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn settings() -> Settings {
        Settings {
            ideal_distance_cm: 50.0,
            min_distance_cm: 35.0,
            max_tilt_deg: 15.0,
            ..Default::default()
        }
    }

    fn present(distance_cm: f64, tilt_deg: f64) -> FrameMeasurement {
        FrameMeasurement {
            distance_cm,
            tilt_deg,
            presence: true,
        }
    }

    #[test]
    fn test_distance_bands() {
        let s = settings();
        let close = classify(&present(20.0, 0.0), &s);
        assert!(close.too_close && !close.at_ideal);
        assert_eq!(close.distance_status(), IndicatorStatus::Warning);

        let middle = classify(&present(40.0, 0.0), &s);
        assert!(!middle.too_close && !middle.at_ideal);
        assert_eq!(middle.distance_status(), IndicatorStatus::Normal);

        let ideal = classify(&present(50.0, 0.0), &s);
        assert!(ideal.at_ideal);
        assert_eq!(ideal.distance_status(), IndicatorStatus::Ideal);
    }

    #[test]
    fn test_tilt_threshold_is_exclusive() {
        let s = settings();
        assert!(!classify(&present(60.0, 15.0), &s).bad_posture);
        assert!(classify(&present(60.0, 15.1), &s).bad_posture);
        assert!(classify(&present(60.0, -20.0), &s).bad_posture);
    }

    #[test]
    fn test_no_face_is_never_close_or_ideal() {
        let c = classify(&FrameMeasurement::absent(), &settings());
        assert_eq!(c, Classification::default());
        assert!(!c.is_violating());
    }

    #[test]
    fn test_primary_violation_prefers_distance() {
        let c = classify(&present(20.0, 30.0), &settings());
        assert_eq!(c.primary_violation(), Some(ViolationKind::Distance));
        assert_eq!(
            c.violations().collect::<Vec<_>>(),
            vec![ViolationKind::Distance, ViolationKind::Posture]
        );

        let posture_only = classify(&present(60.0, 30.0), &settings());
        assert_eq!(posture_only.primary_violation(), Some(ViolationKind::Posture));
        // Ideal distance does not cancel a posture violation
        assert!(posture_only.at_ideal && posture_only.is_violating());
    }

    proptest! {
        #[test]
        fn prop_non_positive_distance_never_close_or_ideal(
            distance in -1000.0f64..=0.0,
            tilt in -90.0f64..90.0,
            ideal in 0.1f64..500.0,
            min in 0.1f64..500.0,
        ) {
            let s = Settings {
                ideal_distance_cm: ideal,
                min_distance_cm: min,
                ..Default::default()
            };
            let c = classify(&present(distance, tilt), &s);
            prop_assert!(!c.too_close);
            prop_assert!(!c.at_ideal);
        }

        #[test]
        fn prop_violating_iff_close_or_tilted(distance in 0.0f64..200.0, tilt in -90.0f64..90.0) {
            let s = settings();
            let c = classify(&present(distance, tilt), &s);
            let expected = (distance > 0.0 && distance < 35.0) || tilt.abs() > 15.0;
            prop_assert_eq!(c.is_violating(), expected);
        }
    }
}
