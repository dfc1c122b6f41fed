//! Threshold rules and escalation routing
//!
//! Rules are evaluated most-severe-first and are not cumulative: the
//! first (highest-severity) matching rule decides the alert level.

use serde::{Deserialize, Serialize};

/// Alert severity, ascending so `max` picks the most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Escalation channel for this severity. Pure lookup.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Critical => Channel::Immediate,
            Self::High => Channel::QueuedSla,
            Self::Medium | Self::Low | Self::Info => Channel::Summary,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Where an alert is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Synchronous notification, right now
    Immediate,
    /// Queued with an SLA
    QueuedSla,
    /// Batched into the next periodic summary
    Summary,
}

/// How a sampled value is compared
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// value > threshold
    Above(f64),
    /// value < threshold
    Below(f64),
    /// value < fraction * current rolling baseline
    BelowBaselineFraction(f64),
    /// value > fraction * current rolling baseline
    AboveBaselineFraction(f64),
}

impl Comparison {
    /// Whether `value` breaches this comparison. Baseline-relative rules
    /// never match without an established baseline.
    pub fn matches(&self, value: f64, baseline: Option<f64>) -> bool {
        match self {
            Self::Above(threshold) => value > *threshold,
            Self::Below(threshold) => value < *threshold,
            Self::BelowBaselineFraction(fraction) => {
                baseline.is_some_and(|b| value < fraction * b)
            }
            Self::AboveBaselineFraction(fraction) => {
                baseline.is_some_and(|b| value > fraction * b)
            }
        }
    }
}

/// One threshold rule for one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric: String,
    pub comparison: Comparison,
    pub severity: Severity,
}

impl ThresholdRule {
    pub fn new(metric: impl Into<String>, comparison: Comparison, severity: Severity) -> Self {
        Self {
            metric: metric.into(),
            comparison,
            severity,
        }
    }
}

/// Ordered rule collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<ThresholdRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standing fleet rules
    pub fn fleet_default() -> Self {
        let mut set = Self::new();
        set.push(ThresholdRule::new(
            "error_rate",
            Comparison::Above(0.05),
            Severity::Critical,
        ));
        set.push(ThresholdRule::new(
            "error_rate",
            Comparison::Above(0.01),
            Severity::Medium,
        ));
        set.push(ThresholdRule::new(
            "traffic",
            Comparison::BelowBaselineFraction(0.1),
            Severity::Critical,
        ));
        set.push(ThresholdRule::new(
            "traffic",
            Comparison::BelowBaselineFraction(0.3),
            Severity::Medium,
        ));
        set.push(ThresholdRule::new(
            "p95_latency_ms",
            Comparison::Above(2000.0),
            Severity::High,
        ));
        set.push(ThresholdRule::new(
            "approval_queue_depth",
            Comparison::Above(25.0),
            Severity::High,
        ));
        set
    }

    pub fn push(&mut self, rule: ThresholdRule) {
        self.rules.push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate a sample against the rules for its metric. The most
    /// severe matching rule wins; rules are not cumulative.
    pub fn evaluate(&self, metric: &str, value: f64, baseline: Option<f64>) -> Option<Severity> {
        self.rules
            .iter()
            .filter(|r| r.metric == metric)
            .filter(|r| r.comparison.matches(value, baseline))
            .map(|r| r.severity)
            .max()
    }
}
