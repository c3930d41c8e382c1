//! Focus feature estimators
//!
//! Three independent, parallelizable estimators consume the read-only
//! landmark set of one frame: gaze deviation, eye openness/blink, and head
//! pose. Each is a pure function with no cross-frame memory; the debounced
//! blink state machine (`BlinkTracker`) lives with the session state.

pub mod blink;
pub mod gaze;
pub mod head_pose;

pub use blink::BlinkTracker;

use crate::config::EngineConfig;
use crate::types::{FocusFeatures, LandmarkSet};

/// Landmark indices and neutral-face geometry shared by the estimators and
/// the synthetic detector. Indices follow the 468-point face-mesh topology.
pub mod mesh {
    pub const NOSE_TIP: usize = 1;
    pub const LEFT_EYE_OUTER: usize = 33;
    pub const LEFT_EYE_INNER: usize = 133;
    pub const LEFT_EYE_UPPER_LID: usize = 159;
    pub const LEFT_EYE_LOWER_LID: usize = 145;
    pub const RIGHT_EYE_INNER: usize = 362;
    pub const RIGHT_EYE_OUTER: usize = 263;
    pub const RIGHT_EYE_UPPER_LID: usize = 386;
    pub const RIGHT_EYE_LOWER_LID: usize = 374;
    pub const MOUTH_LEFT: usize = 61;
    pub const MOUTH_RIGHT: usize = 291;
    pub const UPPER_LIP: usize = 13;
    pub const LOWER_LIP: usize = 14;
    pub const LEFT_BROW: usize = 105;
    pub const RIGHT_BROW: usize = 334;

    /// Eye aspect ratio (lid gap / eye width) of a neutral open eye
    pub const NEUTRAL_EAR: f64 = 0.30;
    /// Nose protrusion as a fraction of inter-ocular distance (fixed head model)
    pub const NOSE_PROTRUSION_RATIO: f64 = 0.35;
    /// Vertical nose-tip drop below the eye line, as a fraction of
    /// inter-ocular distance, for a level head
    pub const NEUTRAL_NOSE_DROP_RATIO: f64 = 0.50;
    /// Brow-to-eye-line distance as a fraction of inter-ocular distance on a
    /// relaxed face
    pub const NEUTRAL_BROW_EYE_RATIO: f64 = 7.0 / 30.0;
}

/// Derive per-frame focus features from a landmark set.
///
/// A no-face landmark set yields the all-null feature set. Head pose is
/// withheld (null) below the detection-confidence floor rather than
/// extrapolated from unreliable points.
pub fn extract(landmarks: &LandmarkSet, config: &EngineConfig) -> FocusFeatures {
    if !landmarks.face_detected {
        return FocusFeatures::default();
    }

    let gaze = gaze::estimate(landmarks);
    let eye_openness = blink::eye_openness(landmarks);
    let blink_closed = eye_openness
        .map(|o| o < config.blink.closed_eye_threshold)
        .unwrap_or(false);

    let pose = if landmarks.confidence < config.detection_confidence_floor {
        None
    } else {
        head_pose::estimate(landmarks)
    };

    FocusFeatures {
        gaze_horizontal: gaze.map(|(h, _)| h),
        gaze_vertical: gaze.map(|(_, v)| v),
        eye_openness,
        blink_closed,
        head_yaw_deg: pose.map(|(y, _)| y),
        head_pitch_deg: pose.map(|(_, p)| p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{LandmarkDetector, SyntheticDetector};
    use crate::types::FrameSample;
    use chrono::Utc;

    fn detect_neutral() -> LandmarkSet {
        let mut detector = SyntheticDetector::default();
        let frame = FrameSample::test_pattern("s", 0, Utc::now(), 64, 64);
        detector.detect(&frame).unwrap()
    }

    #[test]
    fn test_no_face_yields_null_features() {
        let config = EngineConfig::default();
        let features = extract(&LandmarkSet::no_face(), &config);
        assert!(features.gaze_horizontal.is_none());
        assert!(features.eye_openness.is_none());
        assert!(features.head_yaw_deg.is_none());
        assert!(!features.blink_closed);
    }

    #[test]
    fn test_neutral_face_features() {
        let config = EngineConfig::default();
        let features = extract(&detect_neutral(), &config);

        assert!(features.gaze_horizontal.unwrap().abs() < 0.01);
        assert!(features.gaze_vertical.unwrap().abs() < 0.01);
        assert!((features.eye_openness.unwrap() - 1.0).abs() < 0.01);
        assert!(features.head_yaw_deg.unwrap().abs() < 0.5);
        assert!(features.head_pitch_deg.unwrap().abs() < 0.5);
        assert!(!features.blink_closed);
    }

    #[test]
    fn test_low_confidence_withholds_head_pose() {
        let config = EngineConfig::default();
        let mut landmarks = detect_neutral();
        landmarks.confidence = 0.5;

        let features = extract(&landmarks, &config);
        assert!(features.head_yaw_deg.is_none());
        assert!(features.head_pitch_deg.is_none());
        // Gaze and openness are still measured from the same geometry
        assert!(features.gaze_horizontal.is_some());
        assert!(features.eye_openness.is_some());
    }
}
