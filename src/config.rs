//! Engine configuration
//!
//! The fixed configuration surface for the pipeline. Rule thresholds are
//! deliberately configuration rather than hard-wired constants; the defaults
//! below are the values validated by the scenario tests.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Frame format/size contract and quality floors for the Frame Gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Minimum accepted frame width (pixels)
    pub min_width: u32,
    /// Minimum accepted frame height (pixels)
    pub min_height: u32,
    /// Maximum accepted frame buffer size (bytes)
    pub max_frame_bytes: usize,
    /// Normalized mean-luma floor; frames below are tagged `low_light`
    pub lighting_floor: f64,
    /// Mean gradient magnitude floor; frames below are tagged `low_sharpness`
    pub sharpness_floor: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            min_width: 64,
            min_height: 64,
            max_frame_bytes: 8 * 1024 * 1024,
            lighting_floor: 0.15,
            sharpness_floor: 6.0,
        }
    }
}

/// Blink detection thresholds and rolling-rate window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlinkConfig {
    /// Eye openness below this counts as closed
    pub closed_eye_threshold: f64,
    /// Eye openness above this counts as re-opened (hysteresis band)
    pub open_eye_threshold: f64,
    /// Minimum closure duration for a valid blink (milliseconds)
    pub min_blink_ms: i64,
    /// Maximum closure duration for a valid blink (milliseconds)
    pub max_blink_ms: i64,
    /// Rolling window for the blink rate (milliseconds)
    pub blink_window_ms: i64,
    /// Resting blink-rate baseline (blinks per minute)
    pub resting_blink_rate_per_min: f64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            closed_eye_threshold: 0.20,
            open_eye_threshold: 0.25,
            min_blink_ms: 80,
            max_blink_ms: 500,
            blink_window_ms: 60_000,
            resting_blink_rate_per_min: 17.0,
        }
    }
}

/// Focus Fusion component weights and normalization spans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Weight of the inverse-gaze-deviation component
    pub gaze_weight: f64,
    /// Weight of the inverse-blink-rate-deviation component
    pub blink_weight: f64,
    /// Weight of the inverse-head-pose-deviation component
    pub head_weight: f64,
    /// Gaze deviation magnitude mapping to zero focus contribution
    pub max_gaze_deviation: f64,
    /// Head pose deviation (degrees) mapping to zero focus contribution
    pub max_head_deviation_deg: f64,
    /// Blink-rate deviation from resting (blinks/min) mapping to zero contribution
    pub max_blink_rate_deviation_per_min: f64,
    /// Focus score reported when the window holds no usable history
    pub default_focus_score: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gaze_weight: 0.45,
            blink_weight: 0.20,
            head_weight: 0.35,
            max_gaze_deviation: 0.5,
            max_head_deviation_deg: 30.0,
            max_blink_rate_deviation_per_min: 15.0,
            default_focus_score: 0.5,
        }
    }
}

/// Session-aggregator rule thresholds and timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Blink rate above this qualifies toward fatigue (blinks/min)
    pub fatigue_blink_rate_per_min: f64,
    /// Eye openness below this qualifies toward fatigue
    pub fatigue_eye_openness: f64,
    /// Minimum sustained duration before a fatigue flag (milliseconds)
    pub fatigue_min_duration_ms: i64,
    /// Gaze deviation magnitude above this qualifies toward distraction
    pub distraction_gaze_deviation: f64,
    /// Minimum sustained duration before a distraction event (milliseconds)
    pub distraction_min_duration_ms: i64,
    /// Minimum spacing between raised events of the same kind (milliseconds)
    pub event_cooldown_ms: i64,
    /// Frame gap beyond which in-progress rule counters reset (milliseconds)
    pub gap_tolerance_ms: i64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            fatigue_blink_rate_per_min: 25.0,
            fatigue_eye_openness: 0.25,
            fatigue_min_duration_ms: 30_000,
            distraction_gaze_deviation: 0.35,
            distraction_min_duration_ms: 5_000,
            event_cooldown_ms: 60_000,
            gap_tolerance_ms: 2_000,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Detection confidence below this marks records low-confidence
    pub detection_confidence_floor: f64,
    /// Emotion confidence below this marks the classification low-confidence
    pub emotion_confidence_floor: f64,
    /// Smoothing window size in frames
    pub smoothing_window: usize,
    /// Per-frame latency budget (milliseconds, p95 design target)
    pub latency_budget_ms: f64,
    /// Per-session backlog bound for the runtime lanes (oldest dropped first)
    pub max_pending_frames: usize,
    pub frame: FrameConfig,
    pub blink: BlinkConfig,
    pub fusion: FusionConfig,
    pub rules: RuleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection_confidence_floor: 0.85,
            emotion_confidence_floor: 0.6,
            smoothing_window: 10,
            latency_budget_ms: 1_000.0,
            max_pending_frames: 8,
            frame: FrameConfig::default(),
            blink: BlinkConfig::default(),
            fusion: FusionConfig::default(),
            rules: RuleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.smoothing_window == 0 {
            return Err(PipelineError::InvalidConfig(
                "smoothing_window must be at least 1".to_string(),
            ));
        }
        if self.max_pending_frames == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_pending_frames must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection_confidence_floor) {
            return Err(PipelineError::InvalidConfig(
                "detection_confidence_floor must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.emotion_confidence_floor) {
            return Err(PipelineError::InvalidConfig(
                "emotion_confidence_floor must be in [0, 1]".to_string(),
            ));
        }
        if self.blink.open_eye_threshold < self.blink.closed_eye_threshold {
            return Err(PipelineError::InvalidConfig(
                "open_eye_threshold must not be below closed_eye_threshold".to_string(),
            ));
        }
        let weight_sum =
            self.fusion.gaze_weight + self.fusion.blink_weight + self.fusion.head_weight;
        if weight_sum <= 0.0 {
            return Err(PipelineError::InvalidConfig(
                "fusion weights must sum to a positive value".to_string(),
            ));
        }
        if self.rules.gap_tolerance_ms <= 0 {
            return Err(PipelineError::InvalidConfig(
                "gap_tolerance_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_window() {
        let config = EngineConfig {
            smoothing_window: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_blink_thresholds() {
        let mut config = EngineConfig::default();
        config.blink.open_eye_threshold = 0.1;
        config.blink.closed_eye_threshold = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_roundtrip() {
        let json = serde_json::to_string(&EngineConfig::default()).unwrap();
        let config = EngineConfig::from_json(&json).unwrap();
        assert_eq!(config.smoothing_window, 10);
        assert!((config.detection_confidence_floor - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let mut config = EngineConfig::default();
        config.detection_confidence_floor = 1.5;
        let json = serde_json::to_string(&config).unwrap();
        assert!(EngineConfig::from_json(&json).is_err());
    }
}
