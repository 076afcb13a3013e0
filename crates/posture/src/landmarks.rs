//! Face-mesh landmark geometry

use serde::{Deserialize, Serialize};

use crate::MeasurementError;

/// Outer corner of the left eye
pub const LEFT_EYE: usize = 33;
/// Outer corner of the right eye
pub const RIGHT_EYE: usize = 263;
pub const NOSE_TIP: usize = 1;
pub const TOP_HEAD: usize = 10;
pub const CHIN: usize = 152;
pub const LEFT_CHEEK: usize = 234;
pub const RIGHT_CHEEK: usize = 454;

/// Smallest mesh that contains every landmark used here
pub const REQUIRED_LANDMARKS: usize = RIGHT_CHEEK + 1;

/// Average adult interpupillary distance (mm)
const AVERAGE_PUPIL_DISTANCE_MM: f64 = 63.0;
/// Focal length in normalized image units
const FOCAL_LENGTH_NORMALIZED: f64 = 1.2;
/// Padding around the landmark hull when drawing the face box
const FACE_BOX_PADDING: f64 = 0.03;

/// Normalized landmark (x, y in [0, 1], z relative depth)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// 2D point in normalized image coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl From<Landmark> for Point {
    fn from(lm: Landmark) -> Self {
        Self { x: lm.x, y: lm.y }
    }
}

/// Face bounding box in normalized image coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Landmarks the overlay needs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceGeometry {
    pub face_box: FaceBox,
    pub left_eye: Point,
    pub right_eye: Point,
    pub nose_tip: Point,
}

fn check_mesh(mesh: &[Landmark]) -> Result<(), MeasurementError> {
    if mesh.len() < REQUIRED_LANDMARKS {
        return Err(MeasurementError::TooFewLandmarks {
            got: mesh.len(),
            needed: REQUIRED_LANDMARKS,
        });
    }
    let used = [LEFT_EYE, RIGHT_EYE, NOSE_TIP, TOP_HEAD, CHIN, LEFT_CHEEK, RIGHT_CHEEK];
    if used.iter().any(|&i| !mesh[i].is_finite()) {
        return Err(MeasurementError::NonFinite { field: "landmarks" });
    }
    Ok(())
}

/// Uncalibrated viewing distance in centimetres, from the pupil span.
pub fn raw_distance_cm(mesh: &[Landmark]) -> Result<f64, MeasurementError> {
    check_mesh(mesh)?;
    let left = mesh[LEFT_EYE];
    let right = mesh[RIGHT_EYE];
    let span = ((right.x - left.x).powi(2) + (right.y - left.y).powi(2)).sqrt();
    if span <= f64::EPSILON {
        return Err(MeasurementError::DegeneratePupils);
    }
    let distance_mm = AVERAGE_PUPIL_DISTANCE_MM * FOCAL_LENGTH_NORMALIZED / span;
    Ok(distance_mm / 10.0)
}

/// Head roll in degrees; positive when the left eye sits lower.
pub fn tilt_degrees(mesh: &[Landmark]) -> Result<f64, MeasurementError> {
    check_mesh(mesh)?;
    let left = mesh[LEFT_EYE];
    let right = mesh[RIGHT_EYE];
    let dy = left.y - right.y;
    let dx = (left.x - right.x).abs();
    Ok(dy.atan2(dx).to_degrees())
}

/// Face box, eyes and nose tip for drawing
pub fn face_geometry(mesh: &[Landmark]) -> Result<FaceGeometry, MeasurementError> {
    check_mesh(mesh)?;
    let top = mesh[TOP_HEAD];
    let chin = mesh[CHIN];
    let left_cheek = mesh[LEFT_CHEEK];
    let right_cheek = mesh[RIGHT_CHEEK];

    let min_x = left_cheek.x.min(right_cheek.x);
    let max_x = left_cheek.x.max(right_cheek.x);
    let min_y = top.y;
    let max_y = chin.y;

    Ok(FaceGeometry {
        face_box: FaceBox {
            x: (min_x - FACE_BOX_PADDING).max(0.0),
            y: (min_y - FACE_BOX_PADDING).max(0.0),
            width: ((max_x - min_x) + FACE_BOX_PADDING * 2.0).min(1.0),
            height: ((max_y - min_y) + FACE_BOX_PADDING * 2.0).min(1.0),
        },
        left_eye: mesh[LEFT_EYE].into(),
        right_eye: mesh[RIGHT_EYE].into(),
        nose_tip: mesh[NOSE_TIP].into(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Flat mesh with eyes placed `span` apart and `dy` of vertical offset
    pub(crate) fn mesh_with_eyes(span: f64, dy: f64) -> Vec<Landmark> {
        let mut mesh = vec![Landmark::new(0.5, 0.5); 468];
        mesh[LEFT_EYE] = Landmark::new(0.5 - span / 2.0, 0.4 + dy);
        mesh[RIGHT_EYE] = Landmark::new(0.5 + span / 2.0, 0.4);
        mesh[TOP_HEAD] = Landmark::new(0.5, 0.2);
        mesh[CHIN] = Landmark::new(0.5, 0.8);
        mesh[LEFT_CHEEK] = Landmark::new(0.3, 0.5);
        mesh[RIGHT_CHEEK] = Landmark::new(0.7, 0.5);
        mesh[NOSE_TIP] = Landmark::new(0.5, 0.55);
        mesh
    }

    #[test]
    fn test_distance_from_pupil_span() {
        // 63mm * 1.2 / 0.1512 = 500mm
        let mesh = mesh_with_eyes(0.1512, 0.0);
        let d = raw_distance_cm(&mesh).unwrap();
        assert!((d - 50.0).abs() < 1e-6);

        // Half the span, twice the distance
        let mesh = mesh_with_eyes(0.0756, 0.0);
        assert!((raw_distance_cm(&mesh).unwrap() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_tilt() {
        let level = mesh_with_eyes(0.2, 0.0);
        assert!(tilt_degrees(&level).unwrap().abs() < 1e-9);

        let tilted = mesh_with_eyes(0.2, 0.2);
        assert!((tilt_degrees(&tilted).unwrap() - 45.0).abs() < 1e-9);

        let other_way = mesh_with_eyes(0.2, -0.2);
        assert!((tilt_degrees(&other_way).unwrap() + 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_face_box_padding_and_clamp() {
        let geometry = face_geometry(&mesh_with_eyes(0.2, 0.0)).unwrap();
        let b = geometry.face_box;
        assert!((b.x - 0.27).abs() < 1e-9);
        assert!((b.y - 0.17).abs() < 1e-9);
        assert!((b.width - 0.46).abs() < 1e-9);
        assert!((b.height - 0.66).abs() < 1e-9);

        let mut wide = mesh_with_eyes(0.2, 0.0);
        wide[LEFT_CHEEK] = Landmark::new(0.0, 0.5);
        wide[RIGHT_CHEEK] = Landmark::new(1.0, 0.5);
        let b = face_geometry(&wide).unwrap().face_box;
        assert_eq!(b.x, 0.0);
        assert_eq!(b.width, 1.0);
    }

    #[test]
    fn test_invalid_meshes() {
        let short = vec![Landmark::default(); 100];
        assert_eq!(
            raw_distance_cm(&short),
            Err(MeasurementError::TooFewLandmarks { got: 100, needed: 455 })
        );

        let same = mesh_with_eyes(0.0, 0.0);
        assert_eq!(raw_distance_cm(&same), Err(MeasurementError::DegeneratePupils));

        let mut nan = mesh_with_eyes(0.2, 0.0);
        nan[LEFT_EYE].x = f64::NAN;
        assert!(matches!(
            tilt_degrees(&nan),
            Err(MeasurementError::NonFinite { .. })
        ));
    }
}
