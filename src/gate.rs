//! Frame Gate
//!
//! Validates the frame format/size contract and estimates lighting and
//! sharpness from pixel statistics. Frames below the quality floors are
//! tagged with a warning and allowed through with degraded confidence
//! downstream; only contract violations reject.

use crate::config::FrameConfig;
use crate::error::PipelineError;
use crate::types::{FrameFormat, FrameQuality, FrameSample, QualityWarning};

/// Frame gate for quality assessment
pub struct FrameGate;

impl FrameGate {
    /// Assess a frame against the format/size contract and quality floors.
    ///
    /// Returns `PipelineError::MalformedFrame` only for contract violations
    /// (undersized, oversized, or length-mismatched buffers). Quality
    /// shortfalls produce a `FrameQuality` carrying a warning.
    pub fn assess(frame: &FrameSample, config: &FrameConfig) -> Result<FrameQuality, PipelineError> {
        if frame.width < config.min_width || frame.height < config.min_height {
            return Err(PipelineError::MalformedFrame(format!(
                "frame {}x{} below minimum {}x{}",
                frame.width, frame.height, config.min_width, config.min_height
            )));
        }
        if frame.data.len() > config.max_frame_bytes {
            return Err(PipelineError::MalformedFrame(format!(
                "frame buffer {} bytes exceeds maximum {}",
                frame.data.len(),
                config.max_frame_bytes
            )));
        }
        if frame.data.len() != frame.expected_len() {
            return Err(PipelineError::MalformedFrame(format!(
                "frame buffer {} bytes does not match {}x{} {:?}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.format
            )));
        }

        let lighting = estimate_lighting(frame);
        let sharpness = estimate_sharpness(frame);

        let warning = if lighting < config.lighting_floor {
            Some(QualityWarning::LowLight)
        } else if sharpness < config.sharpness_floor {
            Some(QualityWarning::LowSharpness)
        } else {
            None
        };

        Ok(FrameQuality {
            lighting,
            sharpness,
            warning,
        })
    }
}

/// Luma of the pixel at (x, y) using Rec. 601 weights for RGB frames
fn luma_at(frame: &FrameSample, x: u32, y: u32) -> f64 {
    let idx = (y as usize * frame.width as usize + x as usize) * frame.format.bytes_per_pixel();
    match frame.format {
        FrameFormat::Luma8 => frame.data[idx] as f64,
        FrameFormat::Rgb8 => {
            0.299 * frame.data[idx] as f64
                + 0.587 * frame.data[idx + 1] as f64
                + 0.114 * frame.data[idx + 2] as f64
        }
    }
}

/// Normalized mean luminance in [0, 1]
fn estimate_lighting(frame: &FrameSample) -> f64 {
    let mut sum = 0.0;
    for y in 0..frame.height {
        for x in 0..frame.width {
            sum += luma_at(frame, x, y);
        }
    }
    let pixels = (frame.width as f64) * (frame.height as f64);
    (sum / pixels / 255.0).clamp(0.0, 1.0)
}

/// Mean absolute gradient magnitude (horizontal + vertical first differences).
/// Flat or heavily blurred frames score low; detailed frames score high.
fn estimate_sharpness(frame: &FrameSample) -> f64 {
    if frame.width < 2 || frame.height < 2 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut count = 0u64;
    for y in 0..frame.height - 1 {
        for x in 0..frame.width - 1 {
            let here = luma_at(frame, x, y);
            let right = luma_at(frame, x + 1, y);
            let below = luma_at(frame, x, y + 1);
            sum += (here - right).abs() + (here - below).abs();
            count += 2;
        }
    }
    sum / count as f64
}
