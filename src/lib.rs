//! StudyLens - On-device compute engine for facial attention and emotion signals
//!
//! StudyLens transforms a live stream of study-session camera frames into
//! attention and emotion metrics through a deterministic pipeline: frame
//! quality gating → landmark extraction → feature estimation (gaze, blink,
//! head pose) → focus fusion → emotion classification → session aggregation.
//!
//! ## Modules
//!
//! - **Per-frame pipeline**: Gate, detect, and derive focus features for a single frame
//! - **Session aggregation**: Smoothed focus scoring plus fatigue/distraction event detection
//! - **Runtime**: Per-session worker lanes for multi-session, in-order processing

pub mod config;
pub mod detect;
pub mod emit;
pub mod emotion;
pub mod error;
pub mod features;
pub mod fusion;
pub mod gate;
pub mod ops;
pub mod pipeline;
pub mod runtime;
pub mod session;
pub mod types;

pub use config::EngineConfig;
pub use detect::{LandmarkDetector, SidecarDetector, SyntheticDetector};
pub use emit::{JsonLineSink, MemorySink, MetricsSink, NullSink, SharedMemorySink};
pub use error::PipelineError;
pub use pipeline::FocusEngine;
pub use runtime::{EngineOutput, FocusRuntime};

// Type exports
pub use types::{
    DistractionEvent, DistractionKind, EmotionLabel, FatigueFlag, FocusAggregate, FocusFeatures,
    FocusMetricRecord, FrameFormat, FrameSample, LandmarkSet, SessionEvent,
};

/// Engine version embedded in all emitted payloads
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for emitted payloads
pub const PRODUCER_NAME: &str = "studylens";
