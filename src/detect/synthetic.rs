//! Deterministic synthetic detector
//!
//! Generates a parameterizable face mesh whose geometry is exactly
//! consistent with the feature estimators: gaze offsets move the eyelid
//! midpoints within the corner span, eye openness scales the lid gap, and
//! head pose displaces the nose tip through the same fixed head model the
//! estimator inverts. Identical parameters always produce identical
//! landmark sets.
//!
//! The parameter block sits behind a shared handle, so a clone of the
//! detector can keep steering a pipeline that owns the original — the
//! mechanism tests and the CLI simulator use to script a session.

use std::sync::{Arc, Mutex};

use crate::features::mesh;
use crate::types::{FrameSample, LandmarkPoint, LandmarkSet, LANDMARK_COUNT};

use super::LandmarkDetector;

// Canonical neutral-face geometry in normalized image coordinates
const LEFT_EYE_CENTER_X: f64 = 0.40;
const RIGHT_EYE_CENTER_X: f64 = 0.60;
const EYE_LINE_Y: f64 = 0.40;
const EYE_WIDTH: f64 = 0.10;
const MOUTH_Y: f64 = 0.70;
const MOUTH_HALF_WIDTH: f64 = 0.08;
const SMILE_LIFT_SPAN: f64 = 0.03;
const LIP_GAP: f64 = 0.01;

#[derive(Debug, Clone)]
struct FaceParams {
    gaze_h: f64,
    gaze_v: f64,
    eye_openness: f64,
    yaw_deg: f64,
    pitch_deg: f64,
    confidence: f64,
    face_present: bool,
    smile: f64,
    brow_compression: f64,
}

impl Default for FaceParams {
    fn default() -> Self {
        Self {
            gaze_h: 0.0,
            gaze_v: 0.0,
            eye_openness: 1.0,
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            confidence: 0.92,
            face_present: true,
            smile: 0.0,
            brow_compression: 0.0,
        }
    }
}

/// Deterministic fake over the landmark-detection boundary
#[derive(Debug, Clone, Default)]
pub struct SyntheticDetector {
    params: Arc<Mutex<FaceParams>>,
}

impl SyntheticDetector {
    fn with_params<R>(&self, f: impl FnOnce(&mut FaceParams) -> R) -> R {
        let mut guard = match self.params.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Normalized gaze deviation (±1.0 = pupil at the eye-opening edge)
    pub fn set_gaze(&self, horizontal: f64, vertical: f64) {
        self.with_params(|p| {
            p.gaze_h = horizontal;
            p.gaze_v = vertical;
        });
    }

    /// Eye openness ratio in [0, 1]
    pub fn set_eye_openness(&self, openness: f64) {
        self.with_params(|p| p.eye_openness = openness);
    }

    /// Head yaw/pitch in degrees (negative yaw = left, positive pitch = down)
    pub fn set_head_pose(&self, yaw_deg: f64, pitch_deg: f64) {
        self.with_params(|p| {
            p.yaw_deg = yaw_deg;
            p.pitch_deg = pitch_deg;
        });
    }

    /// Detection confidence reported with each frame
    pub fn set_confidence(&self, confidence: f64) {
        self.with_params(|p| p.confidence = confidence);
    }

    /// Whether a face is present at all
    pub fn set_face_present(&self, present: bool) {
        self.with_params(|p| p.face_present = present);
    }

    /// Mouth-corner lift in [0, 1]
    pub fn set_smile(&self, smile: f64) {
        self.with_params(|p| p.smile = smile);
    }

    /// Brow lowering toward the eyes in [0, 1]
    pub fn set_brow_compression(&self, compression: f64) {
        self.with_params(|p| p.brow_compression = compression);
    }
}

fn build_landmarks(params: &FaceParams) -> LandmarkSet {
    // Deterministic filler grid for points without a named role
    let mut points: Vec<LandmarkPoint> = (0..LANDMARK_COUNT)
        .map(|i| LandmarkPoint {
            x: 0.25 + 0.5 * ((i % 22) as f64 / 21.0),
            y: 0.15 + 0.7 * ((i / 22) as f64 / 21.0),
            z: 0.0,
        })
        .collect();

    let at = |x: f64, y: f64| LandmarkPoint { x, y, z: 0.0 };

    // Eye corners on the eye line
    points[mesh::LEFT_EYE_OUTER] = at(LEFT_EYE_CENTER_X - EYE_WIDTH / 2.0, EYE_LINE_Y);
    points[mesh::LEFT_EYE_INNER] = at(LEFT_EYE_CENTER_X + EYE_WIDTH / 2.0, EYE_LINE_Y);
    points[mesh::RIGHT_EYE_INNER] = at(RIGHT_EYE_CENTER_X - EYE_WIDTH / 2.0, EYE_LINE_Y);
    points[mesh::RIGHT_EYE_OUTER] = at(RIGHT_EYE_CENTER_X + EYE_WIDTH / 2.0, EYE_LINE_Y);

    // Eyelids: gap scales with openness, midpoint carries the gaze offset
    let gap = params.eye_openness * mesh::NEUTRAL_EAR * EYE_WIDTH;
    let dx = params.gaze_h * EYE_WIDTH / 2.0;
    let dy = params.gaze_v * EYE_WIDTH / 2.0;
    for &(center_x, upper, lower) in &[
        (
            LEFT_EYE_CENTER_X,
            mesh::LEFT_EYE_UPPER_LID,
            mesh::LEFT_EYE_LOWER_LID,
        ),
        (
            RIGHT_EYE_CENTER_X,
            mesh::RIGHT_EYE_UPPER_LID,
            mesh::RIGHT_EYE_LOWER_LID,
        ),
    ] {
        points[upper] = at(center_x + dx, EYE_LINE_Y + dy - gap / 2.0);
        points[lower] = at(center_x + dx, EYE_LINE_Y + dy + gap / 2.0);
    }

    // Nose tip through the fixed head model
    let iod = RIGHT_EYE_CENTER_X + EYE_WIDTH / 2.0 - (LEFT_EYE_CENTER_X - EYE_WIDTH / 2.0);
    let depth = mesh::NOSE_PROTRUSION_RATIO * iod;
    let nose_x = 0.5 + params.yaw_deg.to_radians().tan() * depth;
    let nose_y = EYE_LINE_Y
        + mesh::NEUTRAL_NOSE_DROP_RATIO * iod
        + params.pitch_deg.to_radians().tan() * depth;
    points[mesh::NOSE_TIP] = at(nose_x, nose_y);

    // Mouth: corners lift with the smile parameter
    let corner_y = MOUTH_Y - SMILE_LIFT_SPAN * params.smile;
    points[mesh::MOUTH_LEFT] = at(0.5 - MOUTH_HALF_WIDTH, corner_y);
    points[mesh::MOUTH_RIGHT] = at(0.5 + MOUTH_HALF_WIDTH, corner_y);
    points[mesh::UPPER_LIP] = at(0.5, MOUTH_Y - LIP_GAP / 2.0);
    points[mesh::LOWER_LIP] = at(0.5, MOUTH_Y + LIP_GAP / 2.0);

    // Brows: compression closes the brow-to-eye distance
    let brow_distance = mesh::NEUTRAL_BROW_EYE_RATIO * iod * (1.0 - params.brow_compression);
    points[mesh::LEFT_BROW] = at(LEFT_EYE_CENTER_X, EYE_LINE_Y - brow_distance);
    points[mesh::RIGHT_BROW] = at(RIGHT_EYE_CENTER_X, EYE_LINE_Y - brow_distance);

    LandmarkSet {
        points,
        confidence: params.confidence,
        face_detected: true,
    }
}

impl LandmarkDetector for SyntheticDetector {
    fn detect(&mut self, _frame: &FrameSample) -> Result<LandmarkSet, crate::error::PipelineError> {
        self.with_params(|params| {
            if !params.face_present {
                Ok(LandmarkSet::no_face())
            } else {
                Ok(build_landmarks(params))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn frame() -> FrameSample {
        FrameSample::test_pattern("s", 0, Utc::now(), 64, 64)
    }

    #[test]
    fn test_full_cardinality() {
        let mut detector = SyntheticDetector::default();
        let landmarks = detector.detect(&frame()).unwrap();
        assert_eq!(landmarks.points.len(), LANDMARK_COUNT);
        assert!(landmarks.face_detected);
        assert!((landmarks.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn test_face_absent() {
        let mut detector = SyntheticDetector::default();
        detector.set_face_present(false);
        let landmarks = detector.detect(&frame()).unwrap();
        assert!(!landmarks.face_detected);
    }

    #[test]
    fn test_deterministic_output() {
        let mut detector = SyntheticDetector::default();
        detector.set_gaze(0.2, -0.1);
        detector.set_head_pose(5.0, -3.0);
        let first = detector.detect(&frame()).unwrap();
        let second = detector.detect(&frame()).unwrap();
        assert_eq!(first.points, second.points);
    }

    #[test]
    fn test_clone_shares_parameters() {
        let mut detector = SyntheticDetector::default();
        let handle = detector.clone();
        handle.set_face_present(false);
        let landmarks = detector.detect(&frame()).unwrap();
        assert!(!landmarks.face_detected);
    }
}
