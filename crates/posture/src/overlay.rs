//! Rendering hints for the video overlay

use serde::{Deserialize, Serialize};

use crate::classifier::Classification;
use crate::landmarks::{FaceBox, FaceGeometry, Point};

/// Where to draw and which elements to draw in warning style
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderHints {
    pub face_box: FaceBox,
    pub left_eye: Point,
    pub right_eye: Point,
    pub nose_tip: Point,
    /// Face box outline: any violation
    pub box_warning: bool,
    /// Eye line: bad posture
    pub eye_line_warning: bool,
    /// Eye points: too close
    pub eye_point_warning: bool,
}

impl RenderHints {
    pub fn new(geometry: &FaceGeometry, classification: &Classification) -> Self {
        Self {
            face_box: geometry.face_box,
            left_eye: geometry.left_eye,
            right_eye: geometry.right_eye,
            nose_tip: geometry.nose_tip,
            box_warning: classification.is_violating(),
            eye_line_warning: classification.bad_posture,
            eye_point_warning: classification.too_close,
        }
    }
}
