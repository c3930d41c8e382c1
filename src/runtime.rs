//! Session runtime
//!
//! One worker lane per active session: frames for a session are processed
//! in submission order by a single writer, while different sessions proceed
//! fully in parallel. Each lane carries a bounded backlog with an explicit
//! oldest-first drop policy, so a session whose frames arrive faster than
//! they can be processed degrades by skipping stale frames instead of
//! queuing without bound. Ending a session cancels its lane and drops
//! in-flight frames without raising further events.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::detect::LandmarkDetector;
use crate::emit::MetricsSink;
use crate::error::PipelineError;
use crate::pipeline::FocusEngine;
use crate::types::{FocusMetricRecord, FrameSample, SessionEvent};

/// Factory producing one detector instance per lane
pub type DetectorFactory = dyn Fn() -> Box<dyn LandmarkDetector + Send> + Send + Sync;

/// Output stream item: every record and event the lanes produce
#[derive(Debug, Clone)]
pub enum EngineOutput {
    Record(FocusMetricRecord),
    Event(SessionEvent),
}

/// Sink adapter forwarding lane output into the runtime channel
struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineOutput>,
}

impl MetricsSink for ChannelSink {
    fn emit_record(&mut self, record: &FocusMetricRecord) -> Result<(), PipelineError> {
        self.tx
            .send(EngineOutput::Record(record.clone()))
            .map_err(|_| PipelineError::EncodingError("output channel closed".to_string()))
    }

    fn emit_event(&mut self, event: &SessionEvent) -> Result<(), PipelineError> {
        self.tx
            .send(EngineOutput::Event(event.clone()))
            .map_err(|_| PipelineError::EncodingError("output channel closed".to_string()))
    }
}

/// Bounded frame backlog for one lane; overflow drops the oldest frame
struct LaneQueue {
    frames: Mutex<VecDeque<FrameSample>>,
    notify: Notify,
    capacity: usize,
    dropped_total: AtomicU64,
}

impl LaneQueue {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped_total: AtomicU64::new(0),
        }
    }

    fn push(&self, frame: FrameSample) {
        let mut dropped = 0u64;
        {
            let mut frames = match self.frames.lock() {
                Ok(frames) => frames,
                Err(poisoned) => poisoned.into_inner(),
            };
            frames.push_back(frame);
            while frames.len() > self.capacity {
                frames.pop_front();
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.dropped_total.fetch_add(dropped, Ordering::Relaxed);
            log::warn!("lane backlog full, dropped {} oldest frame(s)", dropped);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<FrameSample> {
        let mut frames = match self.frames.lock() {
            Ok(frames) => frames,
            Err(poisoned) => poisoned.into_inner(),
        };
        frames.pop_front()
    }

    fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

struct Lane {
    queue: Arc<LaneQueue>,
    cancel: CancellationToken,
}

/// Multi-session runtime over per-session `FocusEngine` lanes
pub struct FocusRuntime {
    config: EngineConfig,
    detector_factory: Arc<DetectorFactory>,
    lanes: HashMap<String, Lane>,
    out_tx: mpsc::UnboundedSender<EngineOutput>,
    out_rx: Option<mpsc::UnboundedReceiver<EngineOutput>>,
}

impl FocusRuntime {
    /// Create a runtime. Must be called within a tokio runtime; lanes are
    /// spawned onto it.
    pub fn new<F>(config: EngineConfig, detector_factory: F) -> Result<Self, PipelineError>
    where
        F: Fn() -> Box<dyn LandmarkDetector + Send> + Send + Sync + 'static,
    {
        config.validate()?;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            detector_factory: Arc::new(detector_factory),
            lanes: HashMap::new(),
            out_tx,
            out_rx: Some(out_rx),
        })
    }

    /// Take the single consumer end of the output stream
    pub fn take_outputs(&mut self) -> Option<mpsc::UnboundedReceiver<EngineOutput>> {
        self.out_rx.take()
    }

    pub fn active_sessions(&self) -> usize {
        self.lanes.len()
    }

    /// Start a lane for the session. Idempotent for an already-active session.
    pub fn start_session(&mut self, session_id: &str) -> Result<(), PipelineError> {
        if self.lanes.contains_key(session_id) {
            return Ok(());
        }

        let mut engine = FocusEngine::new(
            self.config.clone(),
            (self.detector_factory)(),
            Box::new(ChannelSink {
                tx: self.out_tx.clone(),
            }),
        )?;
        engine.start_session(session_id)?;

        let queue = Arc::new(LaneQueue::new(self.config.max_pending_frames));
        let cancel = CancellationToken::new();
        tokio::spawn(lane_worker(
            engine,
            Arc::clone(&queue),
            cancel.clone(),
            session_id.to_string(),
        ));

        self.lanes
            .insert(session_id.to_string(), Lane { queue, cancel });
        log::info!("lane started for session {}", session_id);
        Ok(())
    }

    /// Enqueue a frame for its session's lane
    pub fn submit_frame(&self, frame: FrameSample) -> Result<(), PipelineError> {
        let lane = self
            .lanes
            .get(&frame.session_id)
            .ok_or_else(|| PipelineError::UnknownSession(frame.session_id.clone()))?;
        lane.queue.push(frame);
        Ok(())
    }

    /// Cancel the session's lane, dropping any in-flight frames
    pub fn end_session(&mut self, session_id: &str) -> Result<(), PipelineError> {
        let lane = self
            .lanes
            .remove(session_id)
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))?;
        lane.cancel.cancel();
        log::info!("lane cancelled for session {}", session_id);
        Ok(())
    }

    /// Frames dropped so far by the session's backlog bound
    pub fn dropped_frames(&self, session_id: &str) -> Result<u64, PipelineError> {
        self.lanes
            .get(session_id)
            .map(|lane| lane.queue.dropped_total())
            .ok_or_else(|| PipelineError::UnknownSession(session_id.to_string()))
    }
}

impl Drop for FocusRuntime {
    fn drop(&mut self) {
        for lane in self.lanes.values() {
            lane.cancel.cancel();
        }
    }
}

async fn lane_worker(
    mut engine: FocusEngine,
    queue: Arc<LaneQueue>,
    cancel: CancellationToken,
    session_id: String,
) {
    let mut dropped_noted = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("session {} lane shutting down", session_id);
                break;
            }
            _ = queue.notify.notified() => {
                while let Some(frame) = queue.pop() {
                    if cancel.is_cancelled() {
                        // In-flight frames are dropped on teardown
                        return;
                    }
                    match engine.process_frame(frame) {
                        Ok(_) => {}
                        Err(e) => {
                            log::warn!("session {}: frame rejected in lane: {}", session_id, e);
                        }
                    }
                }
                let dropped = queue.dropped_total();
                if dropped > dropped_noted {
                    engine.note_dropped_frames(dropped - dropped_noted);
                    dropped_noted = dropped;
                }
            }
        }
    }
}
