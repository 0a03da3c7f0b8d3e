//! Inter-beat interval window
//!
//! Intervals arrive at a non-uniform rate, so a time window (e.g. 30 s) is
//! converted into an estimated sample count from the latest interval before
//! old values are evicted.

use crate::stats;
use std::collections::VecDeque;

/// Default time span covered by the window (ms)
pub const DEFAULT_WINDOW_MS: f64 = 30_000.0;

/// Minimum number of intervals retained regardless of the time estimate
pub const MIN_WINDOW_SAMPLES: usize = 10;

/// Extra samples kept on top of the time estimate
pub const WINDOW_SLACK_SAMPLES: usize = 5;

/// Time-bounded buffer of recent inter-beat intervals (ms)
#[derive(Debug, Clone)]
pub struct IbiWindow {
    values: VecDeque<f64>,
    window_ms: f64,
}

impl Default for IbiWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

impl IbiWindow {
    pub fn new(window_ms: f64) -> Self {
        Self {
            values: VecDeque::new(),
            window_ms,
        }
    }

    /// Number of samples the window should hold while the latest interval is
    /// `interval_ms`.
    pub fn estimated_samples(&self, interval_ms: f64) -> usize {
        let estimate = (self.window_ms / interval_ms.max(1.0)).max(MIN_WINDOW_SAMPLES as f64);
        (estimate.round() as usize).saturating_add(WINDOW_SLACK_SAMPLES)
    }

    /// Append an interval and evict the oldest values beyond the size limit
    pub fn push(&mut self, interval_ms: f64) {
        self.values.push_back(interval_ms);

        let limit = self.estimated_samples(interval_ms);
        while self.values.len() > limit && self.values.len() > MIN_WINDOW_SAMPLES {
            self.values.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Mean interval, `None` while empty
    pub fn mean(&self) -> Option<f64> {
        stats::mean(&self.values)
    }

    /// SDNN of the retained intervals
    pub fn sdnn(&self) -> f64 {
        stats::standard_deviation(&self.values)
    }
}
