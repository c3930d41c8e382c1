//! Operational metrics
//!
//! Latency, drop rate, and success rate are tracked as metrics, not
//! exceptions. The latency buffer is bounded; the p95 is computed over the
//! retained samples deterministically.

use std::collections::VecDeque;

/// Bound on retained latency samples
const LATENCY_SAMPLE_CAP: usize = 1_024;

/// Per-engine operational counters
#[derive(Debug, Default)]
pub struct OpsMetrics {
    latencies_ms: VecDeque<f64>,
    processed: u64,
    rejected: u64,
    dropped: u64,
}

impl OpsMetrics {
    /// Record a successfully processed frame and its end-to-end latency
    pub fn record_processed(&mut self, latency_ms: f64) {
        self.processed += 1;
        self.latencies_ms.push_back(latency_ms);
        while self.latencies_ms.len() > LATENCY_SAMPLE_CAP {
            self.latencies_ms.pop_front();
        }
    }

    /// Record a rejected frame (input error)
    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Record frames dropped by backpressure
    pub fn record_dropped(&mut self, count: u64) {
        self.dropped += count;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 95th-percentile latency over the retained samples (ms)
    pub fn p95_latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.latencies_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let index = ((sorted.len() - 1) as f64 * 0.95).ceil() as usize;
        Some(sorted[index.min(sorted.len() - 1)])
    }

    /// Fraction of offered frames that were dropped
    pub fn drop_rate(&self) -> f64 {
        let offered = self.processed + self.dropped;
        if offered == 0 {
            return 0.0;
        }
        self.dropped as f64 / offered as f64
    }
}
