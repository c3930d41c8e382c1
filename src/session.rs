//! Session aggregation
//!
//! Per-session cross-frame state: the smoothing window, the blink tracker,
//! the retained metric series, and the event state machine. This is the only
//! stage with cross-frame state, and each session's state has exactly one
//! writer.
//!
//! The state machine runs `Warming` → `Steady`, moving transiently into
//! `FatigueSuspected`/`DistractionSuspected` while a rule's qualifying
//! window accumulates. An event is raised only once the qualifying condition
//! has been sustained for its minimum duration — single-frame spikes never
//! fire — and a per-kind cooldown spaces repeated events. Frame gaps beyond
//! the configured tolerance reset in-progress counters rather than carrying
//! stale state across the gap.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::features::BlinkTracker;
use crate::fusion::{fuse, FusedFocus, WindowSample};
use crate::types::{
    DistractionEvent, DistractionKind, FatigueFlag, FocusAggregate, FocusMetricRecord,
    SessionEvent,
};

/// Aggregator state for one session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregatorState {
    /// Insufficient history; rules are not evaluated yet
    Warming,
    /// Normal operation
    Steady,
    /// Fatigue qualifying window accumulating since `since_ms`
    FatigueSuspected { since_ms: i64 },
    /// Distraction qualifying window accumulating since `since_ms`
    DistractionSuspected { since_ms: i64, kind: DistractionKind },
}

/// Exclusively-owned per-session mutable state.
///
/// Created on session start, mutated only by the aggregator for that
/// session, discarded on session end.
pub struct SessionWindowState {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    window: VecDeque<WindowSample>,
    pub blink: BlinkTracker,
    history: Vec<FocusMetricRecord>,
    state: AggregatorState,
    frames_seen: u64,
    last_frame_ms: Option<i64>,
    last_score: Option<f64>,
    last_fatigue_ms: Option<i64>,
    last_distraction_ms: Option<i64>,
}

impl SessionWindowState {
    pub fn new(session_id: String, started_at: DateTime<Utc>, config: &EngineConfig) -> Self {
        Self {
            session_id,
            started_at,
            window: VecDeque::with_capacity(config.smoothing_window),
            blink: BlinkTracker::new(config.blink.clone()),
            history: Vec::new(),
            state: AggregatorState::Warming,
            frames_seen: 0,
            last_frame_ms: None,
            last_score: None,
            last_fatigue_ms: None,
            last_distraction_ms: None,
        }
    }

    /// Current aggregator state
    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// Timestamp (ms) of the last processed frame, if any
    pub fn last_frame_ms(&self) -> Option<i64> {
        self.last_frame_ms
    }

    /// Last smoothed focus score, used as the no-information fallback
    pub fn last_score(&self) -> Option<f64> {
        self.last_score
    }

    /// Push this frame's sample into the bounded smoothing window
    pub fn push_sample(&mut self, sample: WindowSample, window_size: usize) {
        self.window.push_back(sample);
        while self.window.len() > window_size {
            self.window.pop_front();
        }
    }

    /// Fuse the current window into a smoothed score and remember it
    pub fn fuse_window(&mut self, config: &EngineConfig) -> FusedFocus {
        let fused = fuse(self.window.make_contiguous(), config);
        if let Some(score) = fused.score {
            self.last_score = Some(score);
        }
        fused
    }

    /// Append an emitted record to the retained series
    pub fn push_record(&mut self, record: FocusMetricRecord) {
        self.history.push(record);
    }

    /// The last `n` records, oldest first
    pub fn recent(&self, n: usize) -> Vec<FocusMetricRecord> {
        let start = self.history.len().saturating_sub(n);
        self.history[start..].to_vec()
    }

    /// The full retained series, oldest first
    pub fn series(&self) -> &[FocusMetricRecord] {
        &self.history
    }

    /// Focus-score aggregate over the retained series
    pub fn aggregate(&self) -> FocusAggregate {
        if self.history.is_empty() {
            return FocusAggregate {
                avg: 0.0,
                min: 0.0,
                max: 0.0,
                count: 0,
            };
        }
        let mut sum = 0.0;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for record in &self.history {
            sum += record.focus_score;
            min = min.min(record.focus_score);
            max = max.max(record.focus_score);
        }
        FocusAggregate {
            avg: sum / self.history.len() as f64,
            min,
            max,
            count: self.history.len(),
        }
    }

    /// Feed one finished record through the event state machine.
    ///
    /// Returns at most one raised event. Must be called in strict timestamp
    /// order; the engine enforces ordering before records get here.
    pub fn observe(
        &mut self,
        record: &FocusMetricRecord,
        config: &EngineConfig,
    ) -> Option<SessionEvent> {
        let now_ms = record.timestamp.timestamp_millis();
        let rules = &config.rules;

        // A gap beyond tolerance invalidates in-progress qualifying windows
        if let Some(last_ms) = self.last_frame_ms {
            let gap = now_ms - last_ms;
            if gap > rules.gap_tolerance_ms
                && matches!(
                    self.state,
                    AggregatorState::FatigueSuspected { .. }
                        | AggregatorState::DistractionSuspected { .. }
                )
            {
                log::warn!(
                    "session {}: {} ms frame gap, resetting rule counters",
                    self.session_id,
                    gap
                );
                self.state = AggregatorState::Steady;
            }
        }
        self.last_frame_ms = Some(now_ms);
        self.frames_seen += 1;

        if self.state == AggregatorState::Warming {
            if self.frames_seen >= config.smoothing_window as u64 {
                self.state = AggregatorState::Steady;
            } else {
                return None;
            }
        }

        let distraction = distraction_condition(record, config);
        let fatigue = fatigue_condition(record, config);

        match self.state {
            AggregatorState::Warming => None,
            AggregatorState::Steady => {
                // Distraction is the cheaper, faster-qualifying rule; it is
                // checked first and the other rule re-qualifies from Steady.
                if let Some((kind, _)) = distraction {
                    self.state = AggregatorState::DistractionSuspected {
                        since_ms: now_ms,
                        kind,
                    };
                } else if fatigue.is_some() {
                    self.state = AggregatorState::FatigueSuspected { since_ms: now_ms };
                }
                None
            }
            AggregatorState::DistractionSuspected { since_ms, kind } => match distraction {
                Some((current_kind, deviation)) if current_kind == kind => {
                    let duration_ms = now_ms - since_ms;
                    if duration_ms >= rules.distraction_min_duration_ms
                        && cooldown_elapsed(self.last_distraction_ms, now_ms, rules.event_cooldown_ms)
                    {
                        self.last_distraction_ms = Some(now_ms);
                        self.state = AggregatorState::Steady;
                        log::info!(
                            "session {}: distraction event ({}) after {} ms",
                            self.session_id,
                            kind.as_str(),
                            duration_ms
                        );
                        Some(SessionEvent::Distraction(DistractionEvent {
                            session_id: self.session_id.clone(),
                            timestamp: record.timestamp,
                            kind,
                            gaze_deviation: deviation,
                            duration_ms,
                        }))
                    } else {
                        None
                    }
                }
                Some((current_kind, _)) => {
                    // The violation changed shape; the window restarts
                    self.state = AggregatorState::DistractionSuspected {
                        since_ms: now_ms,
                        kind: current_kind,
                    };
                    None
                }
                None => {
                    self.state = AggregatorState::Steady;
                    None
                }
            },
            AggregatorState::FatigueSuspected { since_ms } => match fatigue {
                Some((blink_rate, eye_openness)) => {
                    let duration_ms = now_ms - since_ms;
                    if duration_ms >= rules.fatigue_min_duration_ms
                        && cooldown_elapsed(self.last_fatigue_ms, now_ms, rules.event_cooldown_ms)
                    {
                        self.last_fatigue_ms = Some(now_ms);
                        self.state = AggregatorState::Steady;
                        let fatigue_level = fatigue_level(blink_rate, eye_openness, config);
                        log::info!(
                            "session {}: fatigue flag (level {:.2}) after {} ms",
                            self.session_id,
                            fatigue_level,
                            duration_ms
                        );
                        Some(SessionEvent::Fatigue(FatigueFlag {
                            session_id: self.session_id.clone(),
                            timestamp: record.timestamp,
                            fatigue_level,
                            blink_rate_per_min: blink_rate,
                            eye_openness,
                            duration_ms,
                        }))
                    } else {
                        None
                    }
                }
                None => {
                    self.state = AggregatorState::Steady;
                    None
                }
            },
        }
    }
}

/// Distraction qualifying condition for this frame, if any
fn distraction_condition(
    record: &FocusMetricRecord,
    config: &EngineConfig,
) -> Option<(DistractionKind, Option<f64>)> {
    if !record.face_detected {
        return Some((DistractionKind::FaceLost, None));
    }
    let magnitude = record.features.gaze_magnitude()?;
    if magnitude > config.rules.distraction_gaze_deviation {
        return Some((DistractionKind::GazeAway, Some(magnitude)));
    }
    None
}

/// Fatigue qualifying condition: (blink rate, openness) when both violate
fn fatigue_condition(record: &FocusMetricRecord, config: &EngineConfig) -> Option<(f64, f64)> {
    let openness = record.features.eye_openness?;
    if record.blink_rate_per_min > config.rules.fatigue_blink_rate_per_min
        && openness < config.rules.fatigue_eye_openness
    {
        return Some((record.blink_rate_per_min, openness));
    }
    None
}

/// Measured fatigue level in [0, 1] from rate excess and openness deficit
fn fatigue_level(blink_rate: f64, eye_openness: f64, config: &EngineConfig) -> f64 {
    let rate_threshold = config.rules.fatigue_blink_rate_per_min;
    let openness_threshold = config.rules.fatigue_eye_openness;
    let rate_excess = if rate_threshold > 0.0 {
        ((blink_rate - rate_threshold) / rate_threshold).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let openness_deficit = if openness_threshold > 0.0 {
        ((openness_threshold - eye_openness) / openness_threshold).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (0.5 * rate_excess + 0.5 * openness_deficit).clamp(0.0, 1.0)
}

fn cooldown_elapsed(last_event_ms: Option<i64>, now_ms: i64, cooldown_ms: i64) -> bool {
    last_event_ms.map_or(true, |last| now_ms - last >= cooldown_ms)
}
