//! Metrics emitter boundary
//!
//! Finished records and raised events are handed to a `MetricsSink`, the
//! collaborator boundary responsible for persistence and real-time fan-out.
//! The pipeline itself never manages client connections or storage. Encoded
//! payloads are stamped with producer identity so consumers can trace the
//! emitting engine instance.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::types::{FocusMetricRecord, SessionEvent};
use crate::{ENGINE_VERSION, PRODUCER_NAME};

/// Sink for finished records and raised events
pub trait MetricsSink {
    fn emit_record(&mut self, record: &FocusMetricRecord) -> Result<(), PipelineError>;
    fn emit_event(&mut self, event: &SessionEvent) -> Result<(), PipelineError>;
}

/// Producer identity stamped onto encoded payloads
#[derive(Debug, Clone, Serialize)]
pub struct ProducerInfo {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

impl Default for ProducerInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerInfo {
    pub fn new() -> Self {
        Self {
            name: PRODUCER_NAME.to_string(),
            version: ENGINE_VERSION.to_string(),
            instance_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Wire envelope for a record or event payload
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a, T: Serialize> {
    pub producer: &'a ProducerInfo,
    pub emitted_at_utc: String,
    pub kind: &'static str,
    pub payload: &'a T,
}

/// Discards everything. Useful when only the synchronous return values matter.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn emit_record(&mut self, _record: &FocusMetricRecord) -> Result<(), PipelineError> {
        Ok(())
    }

    fn emit_event(&mut self, _event: &SessionEvent) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Bounded in-memory capture of emitted output, for tests and demos
#[derive(Debug)]
pub struct MemorySink {
    pub records: Vec<FocusMetricRecord>,
    pub events: Vec<SessionEvent>,
    capacity: usize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            events: Vec::new(),
            capacity,
        }
    }
}

impl MetricsSink for MemorySink {
    fn emit_record(&mut self, record: &FocusMetricRecord) -> Result<(), PipelineError> {
        if self.records.len() >= self.capacity {
            self.records.remove(0);
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn emit_event(&mut self, event: &SessionEvent) -> Result<(), PipelineError> {
        if self.events.len() >= self.capacity {
            self.events.remove(0);
        }
        self.events.push(event.clone());
        Ok(())
    }
}

/// Cloneable handle over a `MemorySink`, for reading captured output back
/// out of a pipeline that owns the sink.
#[derive(Debug, Clone, Default)]
pub struct SharedMemorySink {
    inner: Arc<Mutex<MemorySink>>,
}

impl SharedMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut MemorySink) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Snapshot of all captured records
    pub fn records(&self) -> Vec<FocusMetricRecord> {
        self.with_inner(|sink| sink.records.clone())
    }

    /// Snapshot of all captured events
    pub fn events(&self) -> Vec<SessionEvent> {
        self.with_inner(|sink| sink.events.clone())
    }
}

impl MetricsSink for SharedMemorySink {
    fn emit_record(&mut self, record: &FocusMetricRecord) -> Result<(), PipelineError> {
        self.with_inner(|sink| sink.emit_record(record))
    }

    fn emit_event(&mut self, event: &SessionEvent) -> Result<(), PipelineError> {
        self.with_inner(|sink| sink.emit_event(event))
    }
}

/// NDJSON sink writing producer-stamped envelopes, one per line
pub struct JsonLineSink<W: Write> {
    writer: W,
    producer: ProducerInfo,
    flush_each: bool,
}

impl<W: Write> JsonLineSink<W> {
    pub fn new(writer: W, flush_each: bool) -> Self {
        Self {
            writer,
            producer: ProducerInfo::new(),
            flush_each,
        }
    }

    fn write_line<T: Serialize>(&mut self, kind: &'static str, payload: &T) -> Result<(), PipelineError> {
        let envelope = Envelope {
            producer: &self.producer,
            emitted_at_utc: Utc::now().to_rfc3339(),
            kind,
            payload,
        };
        let line = serde_json::to_string(&envelope)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        if self.flush_each {
            self.writer.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> MetricsSink for JsonLineSink<W> {
    fn emit_record(&mut self, record: &FocusMetricRecord) -> Result<(), PipelineError> {
        self.write_line("record", record)
    }

    fn emit_event(&mut self, event: &SessionEvent) -> Result<(), PipelineError> {
        self.write_line("event", event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DistractionEvent, DistractionKind, EmotionLabel, FocusFeatures};
    use std::collections::HashMap;

    fn sample_record() -> FocusMetricRecord {
        FocusMetricRecord {
            session_id: "sess".to_string(),
            frame_id: 1,
            timestamp: Utc::now(),
            face_detected: true,
            detection_confidence: 0.92,
            focus_score: 0.8,
            focus_confidence: 0.85,
            features: FocusFeatures::default(),
            blink_rate_per_min: 16.0,
            emotion: EmotionLabel::Neutral,
            emotion_confidence: 0.9,
            emotion_probabilities: HashMap::new(),
            lighting: 0.5,
            sharpness: 12.0,
            quality_warning: None,
            latency_ms: 3.0,
            low_confidence: false,
        }
    }

    #[test]
    fn test_memory_sink_captures() {
        let mut sink = MemorySink::default();
        sink.emit_record(&sample_record()).unwrap();
        sink.emit_event(&SessionEvent::Distraction(DistractionEvent {
            session_id: "sess".to_string(),
            timestamp: Utc::now(),
            kind: DistractionKind::GazeAway,
            gaze_deviation: Some(0.4),
            duration_ms: 5_100,
        }))
        .unwrap();

        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.events.len(), 1);
    }

    #[test]
    fn test_memory_sink_bounded() {
        let mut sink = MemorySink::new(2);
        for i in 0..5 {
            let mut record = sample_record();
            record.frame_id = i;
            sink.emit_record(&record).unwrap();
        }
        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.records[0].frame_id, 3);
        assert_eq!(sink.records[1].frame_id, 4);
    }

    #[test]
    fn test_shared_sink_reads_back() {
        let shared = SharedMemorySink::new();
        let mut handle = shared.clone();
        handle.emit_record(&sample_record()).unwrap();

        assert_eq!(shared.records().len(), 1);
        assert!(shared.events().is_empty());
    }

    #[test]
    fn test_json_line_sink_envelopes() {
        let mut buffer = Vec::new();
        {
            let mut sink = JsonLineSink::new(&mut buffer, true);
            sink.emit_record(&sample_record()).unwrap();
        }

        let line = String::from_utf8(buffer).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["kind"], "record");
        assert_eq!(value["producer"]["name"], PRODUCER_NAME);
        assert_eq!(value["payload"]["session_id"], "sess");
    }
}
