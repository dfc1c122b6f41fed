//! Metric thresholds, alert deduplication, and escalation routing

pub mod baseline;
pub mod engine;
pub mod rules;

pub use baseline::BaselineTracker;
pub use engine::{fingerprint, Alert, AlertEngine, DedupPolicy};
pub use rules::{Channel, Comparison, RuleSet, Severity, ThresholdRule};
