//! Rolling metric baselines
//!
//! A 7-day rolling average per metric, recomputed at most once per day.
//! Comparisons always use the current baseline so thresholds adapt to
//! organic growth and decline. Until a metric has at least one full day
//! of samples, no baseline is reported and baseline-relative rules stay
//! silent.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

/// Per-metric rolling averages
#[derive(Debug, Default)]
pub struct BaselineTracker {
    samples: HashMap<String, VecDeque<(DateTime<Utc>, f64)>>,
    computed: HashMap<String, (DateTime<Utc>, f64)>,
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample, pruning anything older than the 7-day window
    pub fn record(&mut self, metric: &str, value: f64, at: DateTime<Utc>) {
        let series = self.samples.entry(metric.to_string()).or_default();
        series.push_back((at, value));

        let horizon = at - Duration::days(7);
        while series.front().is_some_and(|(t, _)| *t < horizon) {
            series.pop_front();
        }
    }

    /// Current baseline for `metric`, recomputing if the cached value is
    /// more than a day old. Returns `None` until the metric has at least
    /// one day of history.
    pub fn baseline(&mut self, metric: &str, now: DateTime<Utc>) -> Option<f64> {
        if let Some((computed_at, value)) = self.computed.get(metric) {
            if now - *computed_at < Duration::days(1) {
                return Some(*value);
            }
        }

        let series = self.samples.get(metric)?;
        let first = series.front()?.0;
        let last = series.back()?.0;
        if last - first < Duration::days(1) {
            return None;
        }

        let sum: f64 = series.iter().map(|(_, v)| v).sum();
        let avg = sum / series.len() as f64;
        self.computed.insert(metric.to_string(), (now, avg));
        Some(avg)
    }

    /// Number of retained samples for a metric
    pub fn sample_count(&self, metric: &str) -> usize {
        self.samples.get(metric).map(|s| s.len()).unwrap_or(0)
    }
}
