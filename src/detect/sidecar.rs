//! Sidecar face-mesh adapter
//!
//! Production adapter that drives an external face-mesh detector process
//! over its stdin/stdout. The protocol is one JSON header line followed by
//! the raw pixel buffer per request, and one JSON response line per frame:
//!
//! ```text
//! -> {"sequence":12,"width":640,"height":480,"format":"luma8"}\n<pixel bytes>
//! <- {"face_detected":true,"confidence":0.93,"points":[[x,y,z], ...]}\n
//! ```

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{FrameSample, LandmarkPoint, LandmarkSet, FrameFormat, LANDMARK_COUNT};

use super::LandmarkDetector;

/// Request header written before each pixel buffer
#[derive(Debug, Serialize)]
struct FrameHeader {
    sequence: u64,
    width: u32,
    height: u32,
    format: FrameFormat,
}

/// One detection response line from the sidecar
#[derive(Debug, Deserialize)]
struct DetectionResponse {
    face_detected: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    points: Vec<[f64; 3]>,
}

/// Adapter over an external face-mesh detector process
pub struct SidecarDetector {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SidecarDetector {
    /// Spawn the detector process and attach to its pipes
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, PipelineError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::Detector("sidecar stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Detector("sidecar stdout unavailable".to_string()))?;

        log::info!("landmark sidecar started: {}", program);

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn read_response(&mut self) -> Result<DetectionResponse, PipelineError> {
        let mut line = String::new();
        let read = self.stdout.read_line(&mut line)?;
        if read == 0 {
            return Err(PipelineError::Detector(
                "sidecar closed its output stream".to_string(),
            ));
        }
        let response: DetectionResponse = serde_json::from_str(line.trim())?;
        Ok(response)
    }
}

impl LandmarkDetector for SidecarDetector {
    fn detect(&mut self, frame: &FrameSample) -> Result<LandmarkSet, PipelineError> {
        let header = FrameHeader {
            sequence: frame.sequence,
            width: frame.width,
            height: frame.height,
            format: frame.format,
        };
        serde_json::to_writer(&mut self.stdin, &header)?;
        self.stdin.write_all(b"\n")?;
        self.stdin.write_all(&frame.data)?;
        self.stdin.flush()?;

        let response = self.read_response()?;

        if !response.face_detected {
            return Ok(LandmarkSet::no_face());
        }
        if response.points.len() != LANDMARK_COUNT {
            return Err(PipelineError::Detector(format!(
                "sidecar returned {} points, expected {}",
                response.points.len(),
                LANDMARK_COUNT
            )));
        }

        let points = response
            .points
            .iter()
            .map(|p| LandmarkPoint {
                x: p[0],
                y: p[1],
                z: p[2],
            })
            .collect();

        Ok(LandmarkSet {
            points,
            confidence: response.confidence.clamp(0.0, 1.0),
            face_detected: true,
        })
    }
}

impl Drop for SidecarDetector {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            log::warn!("failed to stop landmark sidecar: {}", e);
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{"face_detected":false}"#;
        let response: DetectionResponse = serde_json::from_str(json).unwrap();
        assert!(!response.face_detected);
        assert_eq!(response.confidence, 0.0);
        assert!(response.points.is_empty());
    }

    #[test]
    fn test_response_with_points() {
        let json = r#"{"face_detected":true,"confidence":0.91,"points":[[0.5,0.4,0.0],[0.6,0.4,0.1]]}"#;
        let response: DetectionResponse = serde_json::from_str(json).unwrap();
        assert!(response.face_detected);
        assert!((response.confidence - 0.91).abs() < f64::EPSILON);
        assert_eq!(response.points.len(), 2);
        assert!((response.points[1][2] - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_header_serialization() {
        let header = FrameHeader {
            sequence: 7,
            width: 640,
            height: 480,
            format: FrameFormat::Luma8,
        };
        let json = serde_json::to_string(&header).unwrap();
        assert!(json.contains("\"sequence\":7"));
        assert!(json.contains("\"luma8\""));
    }
}
