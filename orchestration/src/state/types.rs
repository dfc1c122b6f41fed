//! Durable per-agent state
//!
//! The only data a fresh run inherits from its predecessors. Everything
//! else is re-derived from the task router on each invocation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;
use crate::run::{BlockReason, Blocker, RunState};
use crate::task::TaskId;

/// Snapshot of one agent's durable state between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Which agent this partition belongs to
    pub agent: AgentKind,
    /// Cycle counter for the current work episode. Reset to zero when an
    /// episode completes or its budget is exhausted.
    pub iteration: u32,
    /// Identifier of the most recent run
    pub last_run_id: Option<String>,
    /// Terminal (or working) state of the most recent run
    pub last_state: RunState,
    /// Why the most recent run stopped, if it blocked
    pub last_block_reason: Option<BlockReason>,
    /// Tasks the most recent run had claimed
    pub claimed_task_ids: BTreeSet<TaskId>,
    /// Open blockers surfaced to the operator
    pub blockers: Vec<Blocker>,
    /// Counters maintained across runs (tasks resolved, actions executed, ...)
    pub metrics: BTreeMap<String, f64>,
    /// Total runs ever executed for this agent
    pub total_runs: u64,
    /// Monotonic commit counter
    pub version: u64,
    /// When this state was committed
    pub updated_at: DateTime<Utc>,
}

impl AgentState {
    /// Fresh state for an agent with no history
    pub fn new(agent: AgentKind) -> Self {
        Self {
            agent,
            iteration: 0,
            last_run_id: None,
            last_state: RunState::Idle,
            last_block_reason: None,
            claimed_task_ids: BTreeSet::new(),
            blockers: Vec::new(),
            metrics: BTreeMap::new(),
            total_runs: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Add `delta` to a named counter
    pub fn bump_metric(&mut self, name: &str, delta: f64) {
        *self.metrics.entry(name.to_string()).or_insert(0.0) += delta;
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        format!(
            "agent={} iter={} state={} blockers={} v{}",
            self.agent,
            self.iteration,
            self.last_state,
            self.blockers.len(),
            self.version,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = AgentState::new(AgentKind::Ops);
        assert_eq!(state.iteration, 0);
        assert_eq!(state.last_state, RunState::Idle);
        assert!(state.blockers.is_empty());
    }

    #[test]
    fn test_bump_metric_accumulates() {
        let mut state = AgentState::new(AgentKind::Ops);
        state.bump_metric("tasks_resolved", 2.0);
        state.bump_metric("tasks_resolved", 1.0);
        assert_eq!(state.metrics["tasks_resolved"], 3.0);
    }
}
