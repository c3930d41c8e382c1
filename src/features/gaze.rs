//! Gaze estimation
//!
//! Estimates horizontal/vertical gaze deviation from forward using the
//! offset of the iris proxy (eyelid midpoint) within each eye's corner span,
//! averaged over both eyes. An offset of ±1.0 corresponds to the pupil at
//! the edge of the eye opening.

use crate::types::{LandmarkPoint, LandmarkSet, LANDMARK_COUNT};

use super::mesh;

/// Estimate (horizontal, vertical) gaze deviation, or `None` when the
/// landmark set cannot support it.
pub fn estimate(landmarks: &LandmarkSet) -> Option<(f64, f64)> {
    if !landmarks.face_detected || landmarks.points.len() < LANDMARK_COUNT {
        return None;
    }
    let p = &landmarks.points;

    let left = eye_offset(
        p[mesh::LEFT_EYE_OUTER],
        p[mesh::LEFT_EYE_INNER],
        p[mesh::LEFT_EYE_UPPER_LID],
        p[mesh::LEFT_EYE_LOWER_LID],
    )?;
    let right = eye_offset(
        p[mesh::RIGHT_EYE_INNER],
        p[mesh::RIGHT_EYE_OUTER],
        p[mesh::RIGHT_EYE_UPPER_LID],
        p[mesh::RIGHT_EYE_LOWER_LID],
    )?;

    let horizontal = ((left.0 + right.0) / 2.0).clamp(-1.0, 1.0);
    let vertical = ((left.1 + right.1) / 2.0).clamp(-1.0, 1.0);
    Some((horizontal, vertical))
}

/// Pupil-proxy offset within one eye, normalized by the half eye width
fn eye_offset(
    corner_a: LandmarkPoint,
    corner_b: LandmarkPoint,
    upper_lid: LandmarkPoint,
    lower_lid: LandmarkPoint,
) -> Option<(f64, f64)> {
    let width = ((corner_b.x - corner_a.x).powi(2) + (corner_b.y - corner_a.y).powi(2)).sqrt();
    if width <= f64::EPSILON {
        return None;
    }
    let center_x = (corner_a.x + corner_b.x) / 2.0;
    let center_y = (corner_a.y + corner_b.y) / 2.0;
    let pupil_x = (upper_lid.x + lower_lid.x) / 2.0;
    let pupil_y = (upper_lid.y + lower_lid.y) / 2.0;

    let half_width = width / 2.0;
    Some(((pupil_x - center_x) / half_width, (pupil_y - center_y) / half_width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{LandmarkDetector, SyntheticDetector};
    use crate::types::FrameSample;
    use chrono::Utc;

    fn detect(detector: &mut SyntheticDetector) -> LandmarkSet {
        let frame = FrameSample::test_pattern("s", 0, Utc::now(), 64, 64);
        detector.detect(&frame).unwrap()
    }

    #[test]
    fn test_neutral_gaze_is_forward() {
        let mut detector = SyntheticDetector::default();
        let (h, v) = estimate(&detect(&mut detector)).unwrap();
        assert!(h.abs() < 1e-9);
        assert!(v.abs() < 1e-9);
    }

    #[test]
    fn test_horizontal_gaze_recovered() {
        let mut detector = SyntheticDetector::default();
        detector.set_gaze(0.4, 0.0);
        let (h, v) = estimate(&detect(&mut detector)).unwrap();
        assert!((h - 0.4).abs() < 1e-9);
        assert!(v.abs() < 1e-9);
    }

    #[test]
    fn test_vertical_gaze_recovered() {
        let mut detector = SyntheticDetector::default();
        detector.set_gaze(0.0, -0.3);
        let (h, v) = estimate(&detect(&mut detector)).unwrap();
        assert!(h.abs() < 1e-9);
        assert!((v + 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_gaze_independent_of_blink() {
        let mut detector = SyntheticDetector::default();
        detector.set_gaze(0.25, 0.0);
        detector.set_eye_openness(0.1);
        let (h, _) = estimate(&detect(&mut detector)).unwrap();
        assert!((h - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_no_face_returns_none() {
        assert!(estimate(&LandmarkSet::no_face()).is_none());
    }
}
