//! Landmark detector boundary
//!
//! The external landmark-detection capability sits behind the narrow
//! `LandmarkDetector` trait (frame in, landmark set out) so the fusion,
//! smoothing, and event logic stay decoupled from any specific detection
//! model. Two implementations ship with the crate: a production adapter that
//! drives an external face-mesh process, and a deterministic synthetic
//! detector for tests and simulation.

mod sidecar;
mod synthetic;

pub use sidecar::SidecarDetector;
pub use synthetic::SyntheticDetector;

use crate::error::PipelineError;
use crate::types::{FrameSample, LandmarkSet};

/// Trait for landmark detection adapters
pub trait LandmarkDetector {
    /// Extract a landmark set from one frame.
    ///
    /// Contract: a frame with no detectable face returns
    /// `LandmarkSet::no_face()`, not an error. Errors are reserved for
    /// transport/protocol failures, which the pipeline degrades to a
    /// zero-information frame rather than failing the call.
    fn detect(&mut self, frame: &FrameSample) -> Result<LandmarkSet, PipelineError>;
}
