//! Emotion classification
//!
//! Rule/threshold classifier over landmark geometry and derived features.
//! The contract callers depend on: a single best label from the fixed
//! vocabulary, a probability mapping over that vocabulary, and an exposed
//! confidence. A classification below the confidence floor is still emitted
//! and marked low-confidence downstream, never withheld.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::features::mesh;
use crate::types::{EmotionLabel, FocusFeatures, LandmarkSet, EMOTION_VOCABULARY, LANDMARK_COUNT};

/// Mouth-corner lift (as a fraction of mouth width) treated as a full smile
const FULL_SMILE_LIFT_RATIO: f64 = 0.12;
/// Eye openness treated as fully rested; lower openness raises fatigue
const RESTED_OPENNESS: f64 = 0.6;

/// Classifier output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionEstimate {
    pub label: EmotionLabel,
    pub confidence: f64,
    pub probabilities: HashMap<EmotionLabel, f64>,
}

/// Classify the frame's emotion from landmark geometry, features, and the
/// rolling blink rate.
pub fn classify(
    landmarks: &LandmarkSet,
    features: &FocusFeatures,
    blink_rate_per_min: f64,
    config: &EngineConfig,
) -> EmotionEstimate {
    if !landmarks.face_detected || landmarks.points.len() < LANDMARK_COUNT {
        // Zero-information frame: uniform distribution over the vocabulary
        let uniform = 1.0 / EMOTION_VOCABULARY.len() as f64;
        let probabilities = EMOTION_VOCABULARY.iter().map(|&l| (l, uniform)).collect();
        return EmotionEstimate {
            label: EmotionLabel::Neutral,
            confidence: uniform,
            probabilities,
        };
    }

    let resting_rate = config.blink.resting_blink_rate_per_min;
    let rate_excess = if resting_rate > 0.0 {
        ((blink_rate_per_min - resting_rate) / resting_rate).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let happy = (mouth_corner_lift_ratio(landmarks) / FULL_SMILE_LIFT_RATIO).clamp(0.0, 1.0);
    let stressed =
        (0.7 * brow_compression(landmarks) + 0.3 * rate_excess).clamp(0.0, 1.0);

    let openness_deficit = features
        .eye_openness
        .map(|o| ((RESTED_OPENNESS - o) / RESTED_OPENNESS).clamp(0.0, 1.0))
        .unwrap_or(0.0);
    let fatigued = (0.5 * openness_deficit + 0.5 * rate_excess).clamp(0.0, 1.0);

    let neutral = (1.0 - happy.max(stressed).max(fatigued)).clamp(0.0, 1.0);

    let total = neutral + happy + stressed + fatigued;
    let scores = [
        (EmotionLabel::Neutral, neutral),
        (EmotionLabel::Happy, happy),
        (EmotionLabel::Stressed, stressed),
        (EmotionLabel::Fatigued, fatigued),
    ];

    let probabilities: HashMap<EmotionLabel, f64> = if total > 0.0 {
        scores.iter().map(|&(l, s)| (l, s / total)).collect()
    } else {
        let uniform = 1.0 / EMOTION_VOCABULARY.len() as f64;
        EMOTION_VOCABULARY.iter().map(|&l| (l, uniform)).collect()
    };

    // Best label: highest probability, vocabulary order breaking ties
    let mut label = EmotionLabel::Neutral;
    let mut best = f64::MIN;
    for &candidate in EMOTION_VOCABULARY.iter() {
        let p = probabilities[&candidate];
        if p > best {
            best = p;
            label = candidate;
        }
    }

    EmotionEstimate {
        label,
        confidence: best,
        probabilities,
    }
}

/// Mouth-corner lift above the lip center, as a fraction of mouth width
fn mouth_corner_lift_ratio(landmarks: &LandmarkSet) -> f64 {
    let p = &landmarks.points;
    let left = p[mesh::MOUTH_LEFT];
    let right = p[mesh::MOUTH_RIGHT];
    let center_y = (p[mesh::UPPER_LIP].y + p[mesh::LOWER_LIP].y) / 2.0;

    let width = ((right.x - left.x).powi(2) + (right.y - left.y).powi(2)).sqrt();
    if width <= f64::EPSILON {
        return 0.0;
    }
    let corners_y = (left.y + right.y) / 2.0;
    ((center_y - corners_y) / width).max(0.0)
}

/// How far the brows have lowered toward the eye line, in [0, 1]
fn brow_compression(landmarks: &LandmarkSet) -> f64 {
    let p = &landmarks.points;
    let left_eye_y = (p[mesh::LEFT_EYE_OUTER].y + p[mesh::LEFT_EYE_INNER].y) / 2.0;
    let right_eye_y = (p[mesh::RIGHT_EYE_INNER].y + p[mesh::RIGHT_EYE_OUTER].y) / 2.0;
    let brow_y = (p[mesh::LEFT_BROW].y + p[mesh::RIGHT_BROW].y) / 2.0;
    let eye_y = (left_eye_y + right_eye_y) / 2.0;

    let iod = ((p[mesh::RIGHT_EYE_OUTER].x - p[mesh::LEFT_EYE_OUTER].x).powi(2)
        + (p[mesh::RIGHT_EYE_OUTER].y - p[mesh::LEFT_EYE_OUTER].y).powi(2))
    .sqrt();
    if iod <= f64::EPSILON {
        return 0.0;
    }

    let ratio = (eye_y - brow_y) / iod;
    ((mesh::NEUTRAL_BROW_EYE_RATIO - ratio) / mesh::NEUTRAL_BROW_EYE_RATIO).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{LandmarkDetector, SyntheticDetector};
    use crate::types::FrameSample;
    use chrono::Utc;

    fn classify_with(
        detector: &mut SyntheticDetector,
        blink_rate: f64,
        config: &EngineConfig,
    ) -> EmotionEstimate {
        let frame = FrameSample::test_pattern("s", 0, Utc::now(), 64, 64);
        let landmarks = detector.detect(&frame).unwrap();
        let features = crate::features::extract(&landmarks, config);
        classify(&landmarks, &features, blink_rate, config)
    }

    #[test]
    fn test_neutral_face() {
        let config = EngineConfig::default();
        let mut detector = SyntheticDetector::default();
        let estimate = classify_with(&mut detector, 17.0, &config);

        assert_eq!(estimate.label, EmotionLabel::Neutral);
        assert!(estimate.confidence > 0.5);
    }

    #[test]
    fn test_smile_reads_happy() {
        let config = EngineConfig::default();
        let mut detector = SyntheticDetector::default();
        detector.set_smile(0.9);
        let estimate = classify_with(&mut detector, 17.0, &config);

        assert_eq!(estimate.label, EmotionLabel::Happy);
        assert!(estimate.probabilities[&EmotionLabel::Happy] > 0.4);
    }

    #[test]
    fn test_compressed_brows_with_rapid_blinking_reads_stressed() {
        let config = EngineConfig::default();
        let mut detector = SyntheticDetector::default();
        detector.set_brow_compression(0.9);
        let estimate = classify_with(&mut detector, 30.0, &config);

        assert_eq!(estimate.label, EmotionLabel::Stressed);
    }

    #[test]
    fn test_droopy_eyes_and_high_blink_rate_reads_fatigued() {
        let config = EngineConfig::default();
        let mut detector = SyntheticDetector::default();
        detector.set_eye_openness(0.15);
        let estimate = classify_with(&mut detector, 34.0, &config);

        assert_eq!(estimate.label, EmotionLabel::Fatigued);
    }

    #[test]
    fn test_probabilities_cover_vocabulary_and_sum_to_one() {
        let config = EngineConfig::default();
        let mut detector = SyntheticDetector::default();
        detector.set_smile(0.4);
        let estimate = classify_with(&mut detector, 20.0, &config);

        assert_eq!(estimate.probabilities.len(), EMOTION_VOCABULARY.len());
        let sum: f64 = estimate.probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_face_emits_uniform_neutral() {
        let config = EngineConfig::default();
        let estimate = classify(
            &LandmarkSet::no_face(),
            &FocusFeatures::default(),
            0.0,
            &config,
        );

        assert_eq!(estimate.label, EmotionLabel::Neutral);
        assert!((estimate.confidence - 0.25).abs() < 1e-12);
        assert!((estimate.probabilities[&EmotionLabel::Fatigued] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_low_confidence_still_emits() {
        let config = EngineConfig::default();
        let mut detector = SyntheticDetector::default();
        detector.set_smile(0.3); // mild expression, ambiguous
        let estimate = classify_with(&mut detector, 17.0, &config);

        // Whatever the label, the estimate is always produced
        assert!(estimate.confidence > 0.0);
        assert!(!estimate.probabilities.is_empty());
    }
}
