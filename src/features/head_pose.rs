//! Head pose estimation
//!
//! Estimates yaw and pitch from the rigid landmark subset (eye corners and
//! nose tip) by projecting a fixed 3D head model: the nose tip sits
//! `NOSE_PROTRUSION_RATIO` of the inter-ocular distance in front of the eye
//! plane, so its in-image displacement from the neutral position maps to
//! rotation angles through an arctangent.
//!
//! Conventions: negative yaw = head turned toward the image left; positive
//! pitch = head tilted down.

use crate::types::{LandmarkSet, LANDMARK_COUNT};

use super::mesh;

/// Estimate (yaw, pitch) in degrees, or `None` when the landmark set cannot
/// support a rigid-model fit.
pub fn estimate(landmarks: &LandmarkSet) -> Option<(f64, f64)> {
    if !landmarks.face_detected || landmarks.points.len() < LANDMARK_COUNT {
        return None;
    }
    let p = &landmarks.points;

    let left = p[mesh::LEFT_EYE_OUTER];
    let right = p[mesh::RIGHT_EYE_OUTER];
    let nose = p[mesh::NOSE_TIP];

    let iod = ((right.x - left.x).powi(2) + (right.y - left.y).powi(2)).sqrt();
    if iod <= f64::EPSILON {
        return None;
    }

    let eye_mid_x = (left.x + right.x) / 2.0;
    let eye_mid_y = (left.y + right.y) / 2.0;
    let depth = mesh::NOSE_PROTRUSION_RATIO * iod;

    let yaw = ((nose.x - eye_mid_x) / depth).atan().to_degrees();

    let neutral_drop = mesh::NEUTRAL_NOSE_DROP_RATIO * iod;
    let pitch = (((nose.y - eye_mid_y) - neutral_drop) / depth)
        .atan()
        .to_degrees();

    Some((yaw, pitch))
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
    fn test_level_head_reads_zero() {
        let mut detector = SyntheticDetector::default();
        let (yaw, pitch) = estimate(&detect(&mut detector)).unwrap();
        assert!(yaw.abs() < 1e-9);
        assert!(pitch.abs() < 1e-9);
    }

    #[test]
    fn test_yaw_round_trips_through_model() {
        let mut detector = SyntheticDetector::default();
        detector.set_head_pose(-20.0, 0.0);
        let (yaw, pitch) = estimate(&detect(&mut detector)).unwrap();
        assert!((yaw + 20.0).abs() < 1e-6);
        assert!(pitch.abs() < 1e-6);
    }

    #[test]
    fn test_pitch_round_trips_through_model() {
        let mut detector = SyntheticDetector::default();
        detector.set_head_pose(0.0, 15.0);
        let (yaw, pitch) = estimate(&detect(&mut detector)).unwrap();
        assert!(yaw.abs() < 1e-6);
        assert!((pitch - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_combined_rotation() {
        let mut detector = SyntheticDetector::default();
        detector.set_head_pose(10.0, -10.0);
        let (yaw, pitch) = estimate(&detect(&mut detector)).unwrap();
        assert!((yaw - 10.0).abs() < 1e-6);
        assert!((pitch + 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_face_returns_none() {
        assert!(estimate(&LandmarkSet::no_face()).is_none());
    }
}
