//! Blink tracking
//!
//! Eye openness is the eye aspect ratio (lid gap over eye width, both eyes
//! averaged) normalized against a neutral open eye. Blink events are
//! debounced through a four-state machine —
//! Open → Closing → Closed → Opening → Open — so a run of low-openness
//! frames counts as one blink, not one per frame. Completed blinks feed a
//! rolling per-minute rate window.

use std::collections::VecDeque;

use crate::config::BlinkConfig;
use crate::types::{LandmarkPoint, LandmarkSet, LANDMARK_COUNT};

use super::mesh;

/// Rate warmup: below this much observed history the rate reads 0
const RATE_WARMUP_MS: i64 = 10_000;

/// Normalized eye openness in [0, 1], or `None` without a usable face
pub fn eye_openness(landmarks: &LandmarkSet) -> Option<f64> {
    if !landmarks.face_detected || landmarks.points.len() < LANDMARK_COUNT {
        return None;
    }
    let p = &landmarks.points;

    let left = aspect_ratio(
        p[mesh::LEFT_EYE_OUTER],
        p[mesh::LEFT_EYE_INNER],
        p[mesh::LEFT_EYE_UPPER_LID],
        p[mesh::LEFT_EYE_LOWER_LID],
    )?;
    let right = aspect_ratio(
        p[mesh::RIGHT_EYE_INNER],
        p[mesh::RIGHT_EYE_OUTER],
        p[mesh::RIGHT_EYE_UPPER_LID],
        p[mesh::RIGHT_EYE_LOWER_LID],
    )?;

    Some(((left + right) / 2.0 / mesh::NEUTRAL_EAR).clamp(0.0, 1.0))
}

/// Eye aspect ratio: eyelid gap over corner-to-corner width
fn aspect_ratio(
    corner_a: LandmarkPoint,
    corner_b: LandmarkPoint,
    upper_lid: LandmarkPoint,
    lower_lid: LandmarkPoint,
) -> Option<f64> {
    let width = ((corner_b.x - corner_a.x).powi(2) + (corner_b.y - corner_a.y).powi(2)).sqrt();
    if width <= f64::EPSILON {
        return None;
    }
    let gap = ((upper_lid.x - lower_lid.x).powi(2) + (upper_lid.y - lower_lid.y).powi(2)).sqrt();
    Some(gap / width)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EyeState {
    Open,
    Closing { since_ms: i64 },
    Closed,
    Opening,
}

/// Result of one tracker update
#[derive(Debug, Clone, Copy)]
pub struct BlinkUpdate {
    /// Whether a debounced blink completed on this frame
    pub blink_completed: bool,
    /// Blink rate over the rolling window (blinks/min)
    pub rate_per_min: f64,
}

/// Debounced blink detector with a rolling rate window.
///
/// Owned by the session state; one tracker per session.
#[derive(Debug, Clone)]
pub struct BlinkTracker {
    config: BlinkConfig,
    state: EyeState,
    close_start_ms: i64,
    blink_history: VecDeque<i64>,
}

impl BlinkTracker {
    pub fn new(config: BlinkConfig) -> Self {
        Self {
            config,
            state: EyeState::Open,
            close_start_ms: 0,
            blink_history: VecDeque::new(),
        }
    }

    /// Advance the state machine with this frame's openness sample.
    ///
    /// A `None` openness (no face) resets the in-progress closure without
    /// touching the rate history.
    pub fn update(&mut self, openness: Option<f64>, timestamp_ms: i64) -> BlinkUpdate {
        let mut blink_completed = false;

        match openness {
            None => {
                self.state = EyeState::Open;
            }
            Some(o) => match self.state {
                EyeState::Open => {
                    if o < self.config.closed_eye_threshold {
                        self.state = EyeState::Closing {
                            since_ms: timestamp_ms,
                        };
                        self.close_start_ms = timestamp_ms;
                    }
                }
                EyeState::Closing { since_ms } => {
                    if o < self.config.closed_eye_threshold {
                        if timestamp_ms - since_ms >= self.config.min_blink_ms {
                            self.state = EyeState::Closed;
                        }
                    } else if o >= self.config.open_eye_threshold {
                        self.state = EyeState::Open;
                    }
                }
                EyeState::Closed => {
                    if o >= self.config.closed_eye_threshold {
                        self.state = EyeState::Opening;
                    }
                }
                EyeState::Opening => {
                    if o >= self.config.open_eye_threshold {
                        self.state = EyeState::Open;
                        let duration = timestamp_ms - self.close_start_ms;
                        if duration >= self.config.min_blink_ms
                            && duration <= self.config.max_blink_ms
                        {
                            blink_completed = true;
                            self.blink_history.push_back(timestamp_ms);
                            log::debug!(
                                "blink completed ({} ms closure, {} in window)",
                                duration,
                                self.blink_history.len()
                            );
                        }
                    } else if o < self.config.closed_eye_threshold {
                        self.state = EyeState::Closed;
                    }
                }
            },
        }

        self.prune(timestamp_ms);

        BlinkUpdate {
            blink_completed,
            rate_per_min: self.rate_per_min(timestamp_ms),
        }
    }

    /// Blink rate (blinks/min) over the rolling window
    pub fn rate_per_min(&self, now_ms: i64) -> f64 {
        let Some(&first) = self.blink_history.front() else {
            return 0.0;
        };
        let elapsed_ms = now_ms - first;
        if elapsed_ms < RATE_WARMUP_MS {
            return 0.0;
        }
        self.blink_history.len() as f64 / (elapsed_ms as f64 / 60_000.0)
    }

    /// Number of blinks currently inside the window
    pub fn blinks_in_window(&self) -> usize {
        self.blink_history.len()
    }

    pub fn reset(&mut self) {
        self.state = EyeState::Open;
        self.close_start_ms = 0;
        self.blink_history.clear();
    }

    fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.config.blink_window_ms;
        while let Some(&ts) = self.blink_history.front() {
            if ts < cutoff {
                self.blink_history.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{LandmarkDetector, SyntheticDetector};
    use crate::types::FrameSample;
    use chrono::Utc;

    #[test]
    fn test_openness_of_neutral_face() {
        let mut detector = SyntheticDetector::default();
        let frame = FrameSample::test_pattern("s", 0, Utc::now(), 64, 64);
        let landmarks = detector.detect(&frame).unwrap();
        assert!((eye_openness(&landmarks).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_openness_tracks_closure() {
        let mut detector = SyntheticDetector::default();
        detector.set_eye_openness(0.15);
        let frame = FrameSample::test_pattern("s", 0, Utc::now(), 64, 64);
        let landmarks = detector.detect(&frame).unwrap();
        assert!((eye_openness(&landmarks).unwrap() - 0.15).abs() < 1e-9);
    }

    /// Drive the tracker with an openness sequence at a fixed frame interval
    fn run(tracker: &mut BlinkTracker, samples: &[f64], dt_ms: i64) -> usize {
        let mut blinks = 0;
        for (i, &o) in samples.iter().enumerate() {
            let update = tracker.update(Some(o), i as i64 * dt_ms);
            if update.blink_completed {
                blinks += 1;
            }
        }
        blinks
    }

    #[test]
    fn test_single_blink_counted_once() {
        let mut tracker = BlinkTracker::new(BlinkConfig::default());
        // 36 ms frames: open, 4 closed frames (144 ms closure), open again
        let samples = [1.0, 1.0, 0.05, 0.05, 0.05, 0.05, 1.0, 1.0];
        assert_eq!(run(&mut tracker, &samples, 36), 1);
    }

    #[test]
    fn test_too_short_dip_not_counted() {
        let mut tracker = BlinkTracker::new(BlinkConfig::default());
        // One 36 ms closed frame is below the 80 ms minimum
        let samples = [1.0, 1.0, 0.05, 1.0, 1.0];
        assert_eq!(run(&mut tracker, &samples, 36), 0);
    }

    #[test]
    fn test_sustained_closure_not_a_blink() {
        let mut tracker = BlinkTracker::new(BlinkConfig::default());
        // 700 ms closure exceeds max_blink_ms; that is closure, not a blink
        let mut samples = vec![1.0, 1.0];
        samples.extend(std::iter::repeat(0.05).take(20));
        samples.extend([1.0, 1.0]);
        assert_eq!(run(&mut tracker, &samples, 36), 0);
    }

    #[test]
    fn test_rate_over_window() {
        let mut tracker = BlinkTracker::new(BlinkConfig::default());
        // One ~150 ms blink every 3 s for 30 s
        let mut last = BlinkUpdate {
            blink_completed: false,
            rate_per_min: 0.0,
        };
        let mut ts = 0i64;
        for _ in 0..10 {
            for &o in &[1.0, 0.05, 0.05, 0.05, 0.05, 1.0, 1.0] {
                last = tracker.update(Some(o), ts);
                ts += 36;
            }
            ts += 3_000 - 7 * 36;
        }
        // 10 blinks spread over ~27 s of history ≈ 22/min
        assert!(
            (last.rate_per_min - 22.0).abs() < 3.0,
            "rate was {}",
            last.rate_per_min
        );
    }

    #[test]
    fn test_rate_warmup_reads_zero() {
        let mut tracker = BlinkTracker::new(BlinkConfig::default());
        let samples = [1.0, 0.05, 0.05, 0.05, 0.05, 1.0, 1.0];
        run(&mut tracker, &samples, 36);
        // Only ~250 ms of history
        assert_eq!(tracker.rate_per_min(300), 0.0);
        assert_eq!(tracker.blinks_in_window(), 1);
    }

    #[test]
    fn test_no_face_resets_closure_keeps_history() {
        let mut tracker = BlinkTracker::new(BlinkConfig::default());
        let samples = [1.0, 0.05, 0.05, 0.05, 0.05, 1.0, 1.0];
        run(&mut tracker, &samples, 36);
        assert_eq!(tracker.blinks_in_window(), 1);

        tracker.update(None, 1_000);
        assert_eq!(tracker.blinks_in_window(), 1);
        assert_eq!(tracker.state, EyeState::Open);
    }
}
