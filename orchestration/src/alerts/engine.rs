//! Alert evaluation, deduplication, and escalation
//!
//! Each metric sample is scored against the rule set (using the current
//! rolling baseline), then deduplicated by fingerprint: repeats of the
//! same breach inside the dedup window increment `count_in_window` on
//! the existing alert instead of emitting a new one. Alert records are
//! append-only; a window expiry starts a fresh record rather than
//! mutating history.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::baseline::BaselineTracker;
use super::rules::{Channel, RuleSet, Severity};

/// Stable fingerprint for deduplication: hash of metric and component.
pub fn fingerprint(metric: &str, component: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(metric.as_bytes());
    hasher.update([0u8]);
    hasher.update(component.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// A surfaced anomaly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub fingerprint: String,
    pub metric: String,
    pub component: String,
    pub severity: Severity,
    /// Sampled value that opened this alert
    pub value: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Breaches merged into this record, including the first
    pub count_in_window: u32,
}

impl Alert {
    /// Escalation channel for this alert
    pub fn channel(&self) -> Channel {
        self.severity.channel()
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        format!(
            "{} {}/{} value={} count={}",
            self.severity, self.metric, self.component, self.value, self.count_in_window
        )
    }
}

/// Dedup window lengths
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DedupPolicy {
    /// Window for non-critical severities, in seconds
    pub standard_secs: i64,
    /// Window for repeated criticals of the same fingerprint, in seconds
    pub critical_secs: i64,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            standard_secs: 3600,
            critical_secs: 900,
        }
    }
}

impl DedupPolicy {
    fn window_for(&self, severity: Severity) -> Duration {
        if severity == Severity::Critical {
            Duration::seconds(self.critical_secs)
        } else {
            Duration::seconds(self.standard_secs)
        }
    }
}

/// Evaluates metric samples into deduplicated alerts
pub struct AlertEngine {
    rules: RuleSet,
    dedup: DedupPolicy,
    baselines: BaselineTracker,
    /// Most recent alert per fingerprint
    active: HashMap<String, Alert>,
    /// Every alert ever emitted, append-only
    history: Vec<Alert>,
}

impl AlertEngine {
    /// Engine with the standing fleet rules and default windows
    pub fn new() -> Self {
        Self::with_rules(RuleSet::fleet_default())
    }

    /// Engine with an explicit rule set
    pub fn with_rules(rules: RuleSet) -> Self {
        Self {
            rules,
            dedup: DedupPolicy::default(),
            baselines: BaselineTracker::new(),
            active: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Override the dedup windows
    pub fn with_dedup(mut self, dedup: DedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }

    /// Evaluate a sample now
    pub fn evaluate(&mut self, metric: &str, component: &str, value: f64) -> Option<Alert> {
        self.evaluate_at(metric, component, value, Utc::now())
    }

    /// Evaluate a sample taken at `now`. Returns the new alert when one
    /// is surfaced; in-window repeats update the existing record and
    /// return `None`.
    pub fn evaluate_at(
        &mut self,
        metric: &str,
        component: &str,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        self.baselines.record(metric, value, now);
        let baseline = self.baselines.baseline(metric, now);

        let severity = self.rules.evaluate(metric, value, baseline)?;
        let fp = fingerprint(metric, component);
        let window = self.dedup.window_for(severity);

        if let Some(existing) = self.active.get_mut(&fp) {
            if now - existing.last_seen <= window {
                existing.count_in_window += 1;
                existing.last_seen = now;
                existing.severity = existing.severity.max(severity);
                tracing::debug!(alert = %existing.summary(), "alert merged");
                return None;
            }
        }

        let alert = Alert {
            fingerprint: fp.clone(),
            metric: metric.to_string(),
            component: component.to_string(),
            severity,
            value,
            first_seen: now,
            last_seen: now,
            count_in_window: 1,
        };
        tracing::warn!(alert = %alert.summary(), channel = ?alert.channel(), "alert raised");
        self.active.insert(fp, alert.clone());
        self.history.push(alert.clone());
        Some(alert)
    }

    /// Evaluate a sample and publish any surfaced alert on the event
    /// bus. This is the entry point metric/log sources feed.
    pub fn evaluate_and_route(
        &mut self,
        metric: &str,
        component: &str,
        value: f64,
        events: &crate::events::EventBus,
    ) -> Option<Alert> {
        let alert = self.evaluate(metric, component, value)?;
        events.publish(crate::events::OrchestratorEvent::AlertRaised {
            fingerprint: alert.fingerprint.clone(),
            metric: alert.metric.clone(),
            component: alert.component.clone(),
            severity: alert.severity,
            timestamp: alert.first_seen,
        });
        Some(alert)
    }

    /// The current record for a metric/component pair, if any
    pub fn active_alert(&self, metric: &str, component: &str) -> Option<&Alert> {
        self.active.get(&fingerprint(metric, component))
    }

    /// All current alert records
    pub fn active(&self) -> Vec<&Alert> {
        self.active.values().collect()
    }

    /// Every alert ever emitted
    pub fn history(&self) -> &[Alert] {
        &self.history
    }

    /// Baseline access for observability
    pub fn baseline(&mut self, metric: &str, now: DateTime<Utc>) -> Option<f64> {
        self.baselines.baseline(metric, now)
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}
