//! Focus fusion
//!
//! Combines the per-frame feature estimates over the bounded smoothing
//! window into a single smoothed focus score plus a focus confidence.
//!
//! Per-frame instantaneous focus is the weighted combination of three
//! inverse deviations, each normalized to [0, 1]:
//!
//! ```text
//! focus = gaze_weight  * (1 - gaze_deviation / max_gaze_deviation)
//!       + blink_weight * (1 - |blink_rate - resting| / max_blink_rate_deviation)
//!       + head_weight  * (1 - head_deviation / max_head_deviation)
//! ```
//!
//! missing components drop out with their weight renormalized. The window
//! combination uses linear decay weights `w_i = i + 1` (oldest → newest,
//! normalized), so recent frames dominate and the result is fully
//! deterministic. The fused confidence is the same-weighted mean of
//! per-frame detection confidences scaled by the fraction of the window
//! that carried usable features — a low-confidence detection can therefore
//! never raise the focus confidence.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::FocusFeatures;

/// One smoothing-window entry
#[derive(Debug, Clone, Copy)]
pub struct WindowSample {
    pub features: FocusFeatures,
    pub detection_confidence: f64,
    pub blink_rate_per_min: f64,
}

/// Fusion output for one frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusedFocus {
    /// Smoothed focus score; `None` when the window holds no usable frames
    pub score: Option<f64>,
    /// Confidence in the score, in [0, 1]
    pub confidence: f64,
}

/// Fuse the smoothing window (oldest first, newest last) into a focus score.
///
/// Never blocks on a short window: any non-empty history produces output.
pub fn fuse(window: &[WindowSample], config: &EngineConfig) -> FusedFocus {
    if window.is_empty() {
        return FusedFocus {
            score: None,
            confidence: 0.0,
        };
    }

    let mut score_sum = 0.0;
    let mut score_weight = 0.0;
    let mut conf_sum = 0.0;
    let mut conf_weight = 0.0;
    let mut usable = 0usize;

    for (i, sample) in window.iter().enumerate() {
        let w = (i + 1) as f64;
        conf_sum += w * sample.detection_confidence.clamp(0.0, 1.0);
        conf_weight += w;

        if let Some(instant) = instantaneous(sample, config) {
            score_sum += w * instant;
            score_weight += w;
            usable += 1;
        }
    }

    let coverage = usable as f64 / window.len() as f64;
    let confidence = ((conf_sum / conf_weight) * coverage).clamp(0.0, 1.0);

    let score = if score_weight > 0.0 {
        Some((score_sum / score_weight).clamp(0.0, 1.0))
    } else {
        None
    };

    FusedFocus { score, confidence }
}

/// Instantaneous focus for one sample, or `None` for a zero-information frame
fn instantaneous(sample: &WindowSample, config: &EngineConfig) -> Option<f64> {
    let fusion = &config.fusion;
    let mut weighted = 0.0;
    let mut weight = 0.0;

    if let Some(gaze_dev) = sample.features.gaze_magnitude() {
        let inverse = 1.0 - (gaze_dev / fusion.max_gaze_deviation).clamp(0.0, 1.0);
        weighted += fusion.gaze_weight * inverse;
        weight += fusion.gaze_weight;
    }

    if let (Some(yaw), Some(pitch)) = (
        sample.features.head_yaw_deg,
        sample.features.head_pitch_deg,
    ) {
        let head_dev = (yaw * yaw + pitch * pitch).sqrt();
        let inverse = 1.0 - (head_dev / fusion.max_head_deviation_deg).clamp(0.0, 1.0);
        weighted += fusion.head_weight * inverse;
        weight += fusion.head_weight;
    }

    // The blink component needs the eyes in frame and an established rate;
    // a zero rate means no blink has entered the rolling window yet and
    // carries no signal either way.
    if sample.features.eye_openness.is_some() && sample.blink_rate_per_min > 0.0 {
        let rate_dev = (sample.blink_rate_per_min - config.blink.resting_blink_rate_per_min).abs();
        let inverse = 1.0 - (rate_dev / fusion.max_blink_rate_deviation_per_min).clamp(0.0, 1.0);
        weighted += fusion.blink_weight * inverse;
        weight += fusion.blink_weight;
    }

    if weight <= 0.0 {
        return None;
    }
    Some((weighted / weight).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(gaze: f64, yaw: f64, rate: f64, confidence: f64) -> WindowSample {
        WindowSample {
            features: FocusFeatures {
                gaze_horizontal: Some(gaze),
                gaze_vertical: Some(0.0),
                eye_openness: Some(1.0),
                blink_closed: false,
                head_yaw_deg: Some(yaw),
                head_pitch_deg: Some(0.0),
            },
            detection_confidence: confidence,
            blink_rate_per_min: rate,
        }
    }

    fn no_face_sample() -> WindowSample {
        WindowSample {
            features: FocusFeatures::default(),
            detection_confidence: 0.0,
            blink_rate_per_min: 0.0,
        }
    }

    #[test]
    fn test_perfect_attention_scores_one() {
        let config = EngineConfig::default();
        let window = vec![sample(0.0, 0.0, 17.0, 1.0); 10];
        let fused = fuse(&window, &config);
        assert_eq!(fused.score, Some(1.0));
        assert_eq!(fused.confidence, 1.0);
    }

    #[test]
    fn test_single_component_deviation() {
        let config = EngineConfig::default();
        // Gaze at the max deviation zeroes only the gaze component:
        // 0.45*0 + 0.20*1 + 0.35*1 = 0.55
        let window = vec![sample(0.5, 0.0, 17.0, 1.0)];
        let fused = fuse(&window, &config);
        assert!((fused.score.unwrap() - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_short_window_still_produces_output() {
        let config = EngineConfig::default();
        let window = vec![sample(0.1, 2.0, 17.0, 0.9)];
        let fused = fuse(&window, &config);
        assert!(fused.score.is_some());
        assert!(fused.confidence > 0.0);
    }

    #[test]
    fn test_empty_window() {
        let config = EngineConfig::default();
        let fused = fuse(&[], &config);
        assert_eq!(fused.score, None);
        assert_eq!(fused.confidence, 0.0);
    }

    #[test]
    fn test_all_no_face_window() {
        let config = EngineConfig::default();
        let window = vec![no_face_sample(); 10];
        let fused = fuse(&window, &config);
        assert_eq!(fused.score, None);
        assert_eq!(fused.confidence, 0.0);
    }

    #[test]
    fn test_recency_weighting() {
        let config = EngineConfig::default();
        // Nine distracted frames followed by one attentive frame
        let mut window = vec![sample(0.5, 0.0, 17.0, 1.0); 9];
        window.push(sample(0.0, 0.0, 17.0, 1.0));
        let fused = fuse(&window, &config);

        // Simple mean would be 0.55 + 0.45/10 = 0.595; linear decay
        // puts weight 10/55 on the newest frame: 0.55 + 0.45*10/55 ≈ 0.632
        let expected = 0.55 + 0.45 * 10.0 / 55.0;
        assert!((fused.score.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_determinism_bit_identical() {
        let config = EngineConfig::default();
        let window: Vec<WindowSample> = (0..10)
            .map(|i| sample(0.05 * i as f64, i as f64, 14.0 + i as f64, 0.92))
            .collect();

        let first = fuse(&window, &config);
        let second = fuse(&window, &config);
        assert_eq!(
            first.score.unwrap().to_bits(),
            second.score.unwrap().to_bits()
        );
        assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
    }

    #[test]
    fn test_confidence_monotonic_in_detection_confidence() {
        let config = EngineConfig::default();
        let high: Vec<WindowSample> = (0..10).map(|_| sample(0.1, 3.0, 17.0, 0.95)).collect();
        let mut low = high.clone();
        for s in &mut low {
            s.detection_confidence = 0.4;
        }

        let fused_high = fuse(&high, &config);
        let fused_low = fuse(&low, &config);
        assert!(fused_low.confidence < fused_high.confidence);

        // Lowering a single frame must also never raise confidence
        let mut one_low = high.clone();
        one_low[9].detection_confidence = 0.2;
        assert!(fuse(&one_low, &config).confidence <= fused_high.confidence);
    }

    #[test]
    fn test_no_face_frames_attenuate_confidence() {
        let config = EngineConfig::default();
        let mut window = vec![sample(0.0, 0.0, 17.0, 1.0); 5];
        window.extend(vec![no_face_sample(); 5]);
        let fused = fuse(&window, &config);
        // Half the window is zero-information: coverage halves the confidence
        assert!(fused.confidence <= 0.5);
        assert!(fused.score.is_some());
    }
}
