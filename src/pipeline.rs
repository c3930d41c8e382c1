//! Pipeline orchestration
//!
//! This module provides the public API for StudyLens. `FocusEngine` is the
//! stateful multi-session processor; each `process_frame` call runs the full
//! per-frame chain and feeds the finished record through the session
//! aggregator and out to the metrics sink.

use std::collections::HashMap;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::detect::LandmarkDetector;
use crate::emit::{MetricsSink, SharedMemorySink};
use crate::error::PipelineError;
use crate::features;
use crate::fusion::WindowSample;
use crate::gate::FrameGate;
use crate::ops::OpsMetrics;
use crate::session::SessionWindowState;
use crate::types::{
    FocusAggregate, FocusMetricRecord, FrameSample, LandmarkSet, SessionEvent,
};
use crate::{emotion, ENGINE_VERSION};

/// Process an ordered batch of frames for one session (stateless, one-shot).
///
/// Convenience wrapper over `FocusEngine` for batch workloads; returns the
/// records and any raised events together.
///
/// # Example
/// ```ignore
/// let (records, events) = process_frames(
///     EngineConfig::default(),
///     Box::new(SyntheticDetector::default()),
///     "session-1",
///     frames,
/// )?;
/// ```
pub fn process_frames(
    config: EngineConfig,
    detector: Box<dyn LandmarkDetector + Send>,
    session_id: &str,
    frames: Vec<FrameSample>,
) -> Result<(Vec<FocusMetricRecord>, Vec<SessionEvent>), PipelineError> {
    let sink = SharedMemorySink::new();
    let mut engine = FocusEngine::new(config, detector, Box::new(sink.clone()))?;
    engine.start_session(session_id)?;

    let mut records = Vec::with_capacity(frames.len());
    for frame in frames {
        records.push(engine.process_frame(frame)?);
    }
    engine.end_session(session_id)?;

    Ok((records, sink.events()))
}

/// Stateful processor for live multi-session frame streams.
///
/// Owns exactly one `SessionWindowState` per active session; frames for a
/// session must arrive in capture-timestamp order. Stages 1–5 are pure per
/// frame; only the aggregator carries cross-frame state.
pub struct FocusEngine {
    config: EngineConfig,
    detector: Box<dyn LandmarkDetector + Send>,
    sink: Box<dyn MetricsSink + Send>,
    sessions: HashMap<String, SessionWindowState>,
    ops: OpsMetrics,
}

impl FocusEngine {
    /// Create an engine after validating the configuration
    pub fn new(
        config: EngineConfig,
        detector: Box<dyn LandmarkDetector + Send>,
        sink: Box<dyn MetricsSink + Send>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        log::info!("focus engine v{} ready", ENGINE_VERSION);
        Ok(Self {
            config,
            detector,
            sink,
            sessions: HashMap::new(),
            ops: OpsMetrics::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Operational counters (latency p95, drop rate, reject count)
    pub fn ops(&self) -> &OpsMetrics {
        &self.ops
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Acknowledge a session start. Idempotent: re-starting an active
    /// session preserves its state.
    pub fn start_session(&mut self, session_id: &str) -> Result<(), PipelineError> {
        if !self.sessions.contains_key(session_id) {
            let state = SessionWindowState::new(
                session_id.to_string(),
                chrono::Utc::now(),
                &self.config,
            );
            self.sessions.insert(session_id.to_string(), state);
            log::info!("session {} started", session_id);
        }
        Ok(())
    }

    /// Tear down a session's state. In-flight work for the session is
    /// abandoned and no further events are raised.
    pub fn end_session(&mut self, session_id: &str) -> Result<(), PipelineError> {
        match self.sessions.remove(session_id) {
            Some(_) => {
                log::info!("session {} ended", session_id);
                Ok(())
            }
            None => Err(PipelineError::UnknownSession(session_id.to_string())),
        }
    }

    /// Run one frame through the full pipeline and return its record.
    ///
    /// Stages:
    /// 1. FrameGate - format/size contract plus lighting/sharpness estimates
    /// 2. LandmarkDetector - external capability behind the adapter boundary
    /// 3. Feature estimators - gaze, blink, head pose
    /// 4. Focus fusion over the smoothing window
    /// 5. Emotion classification
    /// 6. Session aggregation (event rules)
    /// 7. Emit to the metrics sink
    pub fn process_frame(
        &mut self,
        frame: FrameSample,
    ) -> Result<FocusMetricRecord, PipelineError> {
        let started = Instant::now();
        let session_id = frame.session_id.clone();
        let sequence = frame.sequence;
        let captured_at = frame.captured_at;
        let ts_ms = captured_at.timestamp_millis();

        let Some(state) = self.sessions.get(&session_id) else {
            self.ops.record_rejected();
            return Err(PipelineError::UnknownSession(session_id));
        };

        // Aggregator hysteresis is only correct under strict ordering
        if let Some(last_ms) = state.last_frame_ms() {
            if ts_ms <= last_ms {
                self.ops.record_rejected();
                return Err(PipelineError::MalformedFrame(format!(
                    "frame {} at {} ms does not advance past {} ms",
                    sequence, ts_ms, last_ms
                )));
            }
        }

        // Stage 1: gate
        let quality = match FrameGate::assess(&frame, &self.config.frame) {
            Ok(quality) => quality,
            Err(e) => {
                self.ops.record_rejected();
                return Err(e);
            }
        };

        // Stage 2: detect; transport failures degrade to a no-face frame
        let landmarks = match self.detector.detect(&frame) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                log::warn!(
                    "session {}: detector failed on frame {}, degrading to no-face: {}",
                    session_id,
                    sequence,
                    e
                );
                LandmarkSet::no_face()
            }
        };

        // The raw image is never needed past detection
        drop(frame);

        // Stage 3: features
        let feats = features::extract(&landmarks, &self.config);
        let low_confidence = landmarks.confidence < self.config.detection_confidence_floor;

        let Some(state) = self.sessions.get_mut(&session_id) else {
            self.ops.record_rejected();
            return Err(PipelineError::UnknownSession(session_id));
        };

        let blink_update = state.blink.update(feats.eye_openness, ts_ms);

        // Stage 4: fusion over the bounded window
        state.push_sample(
            WindowSample {
                features: feats,
                detection_confidence: landmarks.confidence,
                blink_rate_per_min: blink_update.rate_per_min,
            },
            self.config.smoothing_window,
        );
        let fused = state.fuse_window(&self.config);
        let focus_score = fused
            .score
            .or(state.last_score())
            .unwrap_or(self.config.fusion.default_focus_score);

        // Stage 5: emotion
        let estimate = emotion::classify(&landmarks, &feats, blink_update.rate_per_min, &self.config);

        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        if latency_ms > self.config.latency_budget_ms {
            log::warn!(
                "session {}: frame {} took {:.1} ms, over the {:.0} ms budget",
                session_id,
                sequence,
                latency_ms,
                self.config.latency_budget_ms
            );
        }

        let record = FocusMetricRecord {
            session_id: session_id.clone(),
            frame_id: sequence,
            timestamp: captured_at,
            face_detected: landmarks.face_detected,
            detection_confidence: landmarks.confidence,
            focus_score,
            focus_confidence: fused.confidence,
            features: feats,
            blink_rate_per_min: blink_update.rate_per_min,
            emotion: estimate.label,
            emotion_confidence: estimate.confidence,
            emotion_probabilities: estimate.probabilities,
            lighting: quality.lighting,
            sharpness: quality.sharpness,
            quality_warning: quality.warning,
            latency_ms,
            low_confidence,
        };

        // Stage 6: aggregate
        let event = state.observe(&record, &self.config);
        state.push_record(record.clone());
        self.ops.record_processed(latency_ms);

        // Stage 7: emit. Sink failures are the collaborator's concern and
        // never fail the frame.
        if let Err(e) = self.sink.emit_record(&record) {
            log::warn!("session {}: sink rejected record: {}", session_id, e);
        }
        if let Some(event) = event {
            if let Err(e) = self.sink.emit_event(&event) {
                log::warn!("session {}: sink rejected event: {}", session_id, e);
            }
        }

        Ok(record)
    }

    /// The last `n` records for a session, oldest first
    pub fn recent_metrics(
        &self,
        session_id: &str,
        n: usize,
    ) -> Result<Vec<FocusMetricRecord>, PipelineError> {
        self.session(session_id).map(|state| state.recent(n))
    }

    /// The full retained series for a session, oldest first
    pub fn time_series(&self, session_id: &str) -> Result<Vec<FocusMetricRecord>, PipelineError> {
        self.session(session_id).map(|state| state.series().to_vec())
    }

    /// Focus-score aggregate for a session
    pub fn aggregate(&self, session_id: &str) -> Result<FocusAggregate, PipelineError> {
        self.session(session_id).map(|state| state.aggregate())
    }

    fn session(&self, session_id: &str) -> Result<&SessionWindowState, PipelineError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))
    }

    /// Count frames the runtime dropped for this engine's lane
    pub fn note_dropped_frames(&mut self, count: u64) {
        if count > 0 {
            self.ops.record_dropped(count);
        }
    }
}
