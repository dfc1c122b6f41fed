//! Static risk policy table
//!
//! Classification is a pure function over an action's kind and payload.
//! There are no counters and no history here: the same action always
//! classifies the same way against the same table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::agent::AgentKind;

/// Risk tier of a proposed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Executes autonomously
    Low,
    /// Requires human approval
    Medium,
    /// Requires human approval
    High,
    /// Never executes, approval or not
    Forbidden,
}

impl RiskTier {
    /// Whether an action at this tier needs a human approval before it
    /// may execute
    pub fn needs_approval(&self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Forbidden => write!(f, "forbidden"),
        }
    }
}

/// Payload path prefixes that are security-sensitive. Any action whose
/// payload touches one of these is forbidden for automated execution.
const PROTECTED_PREFIXES: &[&str] = &[
    "secrets/",
    ".env",
    ".github/workflows/",
    "infra/security/",
];

/// Per-agent risk policy table.
///
/// Lookup order: globally forbidden kinds, then payload path screening,
/// then the agent's own rules, then the table default. The default is
/// `Medium` so unknown kinds fail closed into the approval queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Kinds no agent may ever execute
    global_forbidden: BTreeSet<String>,
    /// Per-agent kind overrides
    agent_rules: BTreeMap<AgentKind, BTreeMap<String, RiskTier>>,
    /// Tier for kinds with no matching rule
    default_tier: RiskTier,
}

impl PolicyTable {
    /// Empty table with a fail-closed default
    pub fn new() -> Self {
        Self {
            global_forbidden: BTreeSet::new(),
            agent_rules: BTreeMap::new(),
            default_tier: RiskTier::Medium,
        }
    }

    /// The standing fleet policy.
    pub fn fleet_default() -> Self {
        let mut table = Self::new();

        // Irreversible or trust-boundary operations
        table.forbid("merge_main");
        table.forbid("delete_customer_data");
        table.forbid("rotate_credentials");

        // Money always goes through a human
        table.set_rule(AgentKind::Finance, "refund", RiskTier::Medium);
        table.set_rule(AgentKind::Finance, "send_invoice", RiskTier::Low);
        table.set_rule(AgentKind::Finance, "write_off", RiskTier::High);

        // Support/Growth routine communication is autonomous
        table.set_rule(AgentKind::Support, "send_email", RiskTier::Low);
        table.set_rule(AgentKind::Support, "close_ticket", RiskTier::Low);
        table.set_rule(AgentKind::Support, "escalate_ticket", RiskTier::Low);
        table.set_rule(AgentKind::Growth, "send_email", RiskTier::Low);
        table.set_rule(AgentKind::Growth, "schedule_post", RiskTier::Low);
        table.set_rule(AgentKind::Growth, "apply_discount", RiskTier::Medium);

        // Code changes ship as reviewable proposals
        table.set_rule(AgentKind::Code, "create_pr", RiskTier::Low);
        table.set_rule(AgentKind::Code, "edit_file", RiskTier::Low);
        table.set_rule(AgentKind::Code, "deploy", RiskTier::High);

        // Ops housekeeping
        table.set_rule(AgentKind::Ops, "restart_service", RiskTier::Medium);
        table.set_rule(AgentKind::Ops, "scale_service", RiskTier::Medium);
        table.set_rule(AgentKind::Ops, "prune_logs", RiskTier::Low);

        // Oversight agents only observe and report
        table.set_rule(AgentKind::Meta, "post_report", RiskTier::Low);
        table.set_rule(AgentKind::Monitoring, "record_metric", RiskTier::Low);
        table.set_rule(AgentKind::Monitoring, "raise_alert", RiskTier::Low);

        table
    }

    /// Forbid a kind for every agent
    pub fn forbid(&mut self, kind: impl Into<String>) {
        self.global_forbidden.insert(kind.into());
    }

    /// Set the tier for one agent and kind
    pub fn set_rule(&mut self, agent: AgentKind, kind: impl Into<String>, tier: RiskTier) {
        self.agent_rules
            .entry(agent)
            .or_default()
            .insert(kind.into(), tier);
    }

    /// Set the default tier for unmatched kinds
    pub fn set_default_tier(&mut self, tier: RiskTier) {
        self.default_tier = tier;
    }

    /// Classify an action. Pure: same inputs, same tier.
    pub fn classify(&self, agent: AgentKind, kind: &str, payload: &serde_json::Value) -> RiskTier {
        if self.global_forbidden.contains(kind) {
            return RiskTier::Forbidden;
        }
        if touches_protected_path(payload) {
            return RiskTier::Forbidden;
        }
        self.agent_rules
            .get(&agent)
            .and_then(|rules| rules.get(kind))
            .copied()
            .unwrap_or(self.default_tier)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::fleet_default()
    }
}

/// Whether the payload names a security-sensitive path under `path` or
/// `paths`.
fn touches_protected_path(payload: &serde_json::Value) -> bool {
    let is_protected =
        |p: &str| PROTECTED_PREFIXES.iter().any(|prefix| p.starts_with(prefix));

    if let Some(path) = payload.get("path").and_then(|v| v.as_str()) {
        if is_protected(path) {
            return true;
        }
    }
    if let Some(paths) = payload.get("paths").and_then(|v| v.as_array()) {
        if paths
            .iter()
            .filter_map(|v| v.as_str())
            .any(is_protected)
        {
            return true;
        }
    }
    false
}
