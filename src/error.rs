//! Error types for StudyLens
//!
//! Only input errors (malformed frames, unknown sessions) reject a call.
//! Degraded-quality conditions (low light, no face, low confidence) are
//! surfaced as warning flags on otherwise-valid records, never as errors.

use thiserror::Error;

/// Errors that can occur while processing frames
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Landmark detector failure: {0}")]
    Detector(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
