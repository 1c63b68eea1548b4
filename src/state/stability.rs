use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Time-bounded window of raw measurements for one pair.
///
/// Samples are kept ordered by timestamp, so eviction only ever pops from the
/// front. Out-of-order inserts are placed with a binary search.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    window: Duration,
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

impl StabilityTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a value and evict everything that fell out of the window.
    pub fn insert(&mut self, at: DateTime<Utc>, value: f64) {
        match self.samples.back() {
            Some((last, _)) if *last > at => {
                let index = self.samples.partition_point(|(ts, _)| *ts <= at);
                self.samples.insert(index, (at, value));
            }
            _ => self.samples.push_back((at, value)),
        }

        let newest = self.samples.back().map_or(at, |(ts, _)| *ts);
        self.expire(newest);
    }

    /// Drop samples with a timestamp before `now - window`.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = now.checked_sub_signed(self.window) else {
            return;
        };
        while self.samples.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|(_, value)| *value)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.samples.iter().map(|(ts, _)| *ts)
    }

    /// Population variance of the window, `None` with fewer than two samples.
    pub fn variance(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }

        let n = self.samples.len() as f64;
        let mean = self.values().sum::<f64>() / n;
        let variance = self.values().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(variance)
    }
}
