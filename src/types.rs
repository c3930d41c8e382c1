//! Core types for the StudyLens pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: frame samples, landmark sets, focus features, per-frame metric
//! records, and session-scoped events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of points in a complete face-mesh landmark set
pub const LANDMARK_COUNT: usize = 468;

/// Pixel layout of an incoming frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    Luma8,
    Rgb8,
}

impl FrameFormat {
    /// Bytes per pixel for this format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Luma8 => 1,
            FrameFormat::Rgb8 => 3,
        }
    }
}

/// A single camera frame belonging to one study session.
///
/// Ephemeral: consumed by value by the pipeline pass that received it and
/// never retained after metric extraction.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Session this frame belongs to
    pub session_id: String,
    /// Monotonic capture sequence number
    pub sequence: u64,
    /// Capture timestamp (UTC)
    pub captured_at: DateTime<Utc>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: FrameFormat,
    /// Raw pixel buffer
    pub data: Vec<u8>,
}

impl FrameSample {
    /// Expected byte length of `data` for the declared dimensions and format
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Build a synthetic diagonal-gradient test frame with adequate lighting
    /// and sharpness. Used by the CLI simulator and tests.
    pub fn test_pattern(
        session_id: impl Into<String>,
        sequence: u64,
        captured_at: DateTime<Utc>,
        width: u32,
        height: u32,
    ) -> Self {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((((x * 7 + y * 13) % 160) + 64) as u8);
            }
        }
        Self {
            session_id: session_id.into(),
            sequence,
            captured_at,
            width,
            height,
            format: FrameFormat::Luma8,
            data,
        }
    }
}

/// A single normalized facial landmark point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Fixed-cardinality set of normalized facial landmarks for one frame.
///
/// Derived from exactly one `FrameSample`; immutable once produced. A frame
/// with no detectable face is represented as `face_detected = false` with an
/// empty point set — a normal, zero-information frame, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkSet {
    /// Normalized (x, y, z) points; `LANDMARK_COUNT` entries when a face was found
    pub points: Vec<LandmarkPoint>,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    /// Whether a face was located in the frame
    pub face_detected: bool,
}

impl LandmarkSet {
    /// The zero-information landmark set for a frame with no detectable face
    pub fn no_face() -> Self {
        Self {
            points: Vec::new(),
            confidence: 0.0,
            face_detected: false,
        }
    }
}

/// Per-frame focus features derived from one `LandmarkSet`.
///
/// All fields are `None` (and `blink_closed` false) when no face was
/// detected in the frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FocusFeatures {
    /// Horizontal gaze deviation from forward, normalized (negative = left)
    pub gaze_horizontal: Option<f64>,
    /// Vertical gaze deviation from forward, normalized (negative = up)
    pub gaze_vertical: Option<f64>,
    /// Eye openness ratio in [0, 1] relative to a neutral open eye
    pub eye_openness: Option<f64>,
    /// Whether the eyes are instantaneously below the closed-eye threshold
    pub blink_closed: bool,
    /// Head yaw in degrees (negative = turned left)
    pub head_yaw_deg: Option<f64>,
    /// Head pitch in degrees (positive = tilted down)
    pub head_pitch_deg: Option<f64>,
}

impl FocusFeatures {
    /// Combined gaze deviation magnitude, if gaze is available
    pub fn gaze_magnitude(&self) -> Option<f64> {
        match (self.gaze_horizontal, self.gaze_vertical) {
            (Some(h), Some(v)) => Some((h * h + v * v).sqrt()),
            _ => None,
        }
    }
}

/// Emotion vocabulary (fixed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Neutral,
    Happy,
    Stressed,
    Fatigued,
}

impl EmotionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Stressed => "stressed",
            EmotionLabel::Fatigued => "fatigued",
        }
    }
}

/// The complete emotion vocabulary, in canonical order
pub const EMOTION_VOCABULARY: [EmotionLabel; 4] = [
    EmotionLabel::Neutral,
    EmotionLabel::Happy,
    EmotionLabel::Stressed,
    EmotionLabel::Fatigued,
];

/// Quality warning attached to a record for a degraded (never rejected) frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityWarning {
    LowLight,
    LowSharpness,
}

impl QualityWarning {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityWarning::LowLight => "low_light",
            QualityWarning::LowSharpness => "low_sharpness",
        }
    }
}

/// Frame Gate output: pixel-statistic quality estimates for one frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrameQuality {
    /// Normalized mean luminance in [0, 1]
    pub lighting: f64,
    /// Mean gradient magnitude (higher = sharper)
    pub sharpness: f64,
    /// Warning when the frame is below the lighting/sharpness floors
    pub warning: Option<QualityWarning>,
}

/// The per-frame unit of output and persistence.
///
/// Created once per processed frame, never mutated afterward; owned by the
/// caller once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusMetricRecord {
    /// Session identifier
    pub session_id: String,
    /// Frame identifier (capture sequence number)
    pub frame_id: u64,
    /// Capture timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Whether a face was detected
    pub face_detected: bool,
    /// Landmark detection confidence in [0, 1]
    pub detection_confidence: f64,
    /// Smoothed focus score in [0, 1]
    pub focus_score: f64,
    /// Confidence in the focus score, in [0, 1]
    pub focus_confidence: f64,
    /// Raw per-frame features
    pub features: FocusFeatures,
    /// Blink rate over the rolling window at this frame (blinks/min)
    pub blink_rate_per_min: f64,
    /// Best emotion label
    pub emotion: EmotionLabel,
    /// Confidence of the best emotion label
    pub emotion_confidence: f64,
    /// Probability mapping over the fixed emotion vocabulary
    pub emotion_probabilities: HashMap<EmotionLabel, f64>,
    /// Normalized lighting estimate
    pub lighting: f64,
    /// Sharpness estimate
    pub sharpness: f64,
    /// Quality warning, if the frame was degraded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_warning: Option<QualityWarning>,
    /// End-to-end processing latency for this frame (milliseconds)
    pub latency_ms: f64,
    /// Whether detection confidence was below the configured floor
    pub low_confidence: bool,
}

/// Fatigue flag raised when sustained blink/eye-openness patterns indicate tiredness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatigueFlag {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Measured fatigue level in [0, 1]
    pub fatigue_level: f64,
    /// Blink rate over the rolling window (blinks/min)
    pub blink_rate_per_min: f64,
    /// Eye openness at the time the flag was raised
    pub eye_openness: f64,
    /// Duration of the qualifying condition (milliseconds)
    pub duration_ms: i64,
}

/// What pulled attention away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistractionKind {
    /// Gaze sustained beyond the deviation threshold
    GazeAway,
    /// Face left the frame
    FaceLost,
}

impl DistractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistractionKind::GazeAway => "gaze_away",
            DistractionKind::FaceLost => "face_lost",
        }
    }
}

/// Distraction event raised when sustained gaze/head deviation indicates
/// attention has left the study material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistractionEvent {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: DistractionKind,
    /// Gaze deviation magnitude while qualifying (absent for `FaceLost`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gaze_deviation: Option<f64>,
    /// Duration of the qualifying condition (milliseconds)
    pub duration_ms: i64,
}

/// Session-scoped event handed to the emitter boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SessionEvent {
    Fatigue(FatigueFlag),
    Distraction(DistractionEvent),
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Fatigue(f) => &f.session_id,
            SessionEvent::Distraction(d) => &d.session_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::Fatigue(f) => f.timestamp,
            SessionEvent::Distraction(d) => d.timestamp,
        }
    }
}

/// Session-level focus score aggregate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FocusAggregate {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// Number of records aggregated
    pub count: usize,
}
