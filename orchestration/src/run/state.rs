//! Run state: one bounded execution cycle of an agent
//!
//! A run is constructed fresh per invocation and discarded afterwards;
//! the only thing the next cycle inherits is what was committed to the
//! state store. `Idle → Working` happens on the first claim; the run
//! ends `Complete`, `Blocked`, or `Working` (incomplete, continuation
//! requested through the dispatcher).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionId;
use crate::agent::AgentKind;
use crate::task::TaskId;

/// Run lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Constructed, nothing claimed yet
    Idle,
    /// At least one task claimed
    Working,
    /// Stopped before the completion predicate held
    Blocked,
    /// Completion predicate held and state persisted
    Complete,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Working => write!(f, "working"),
            Self::Blocked => write!(f, "blocked"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    /// The self-dispatch chain hit its hard cap. Not an error; resumed
    /// by the next scheduled invocation.
    IterationBudgetExhausted { max: u32 },
    /// The cycle outlived its wall-clock budget
    WallClockExhausted { budget_secs: u64 },
    /// Unexpected failure; nothing was committed
    FatalError { message: String },
    /// The global emergency stop was engaged
    EmergencyStop,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IterationBudgetExhausted { max } => {
                write!(f, "iteration budget exhausted ({} cycles)", max)
            }
            Self::WallClockExhausted { budget_secs } => {
                write!(f, "wall clock exhausted ({}s)", budget_secs)
            }
            Self::FatalError { message } => write!(f, "fatal: {}", message),
            Self::EmergencyStop => write!(f, "emergency stop"),
        }
    }
}

/// A structured reason why some work could not finish, surfaced to the
/// operator through the persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Blocker {
    /// Action parked for human review; re-surfaced every cycle until a
    /// terminal decision exists
    ApprovalPending {
        action_id: ActionId,
        action_kind: String,
        task_id: TaskId,
    },
    /// Action permanently denied by policy
    RiskDenied {
        action_id: ActionId,
        action_kind: String,
        task_id: TaskId,
        reason: String,
    },
    /// Executor kept failing after bounded retries
    ExecutionFailed {
        action_id: ActionId,
        action_kind: String,
        task_id: TaskId,
        detail: String,
    },
}

impl std::fmt::Display for Blocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApprovalPending {
                action_kind,
                task_id,
                ..
            } => write!(f, "{} on {} awaiting approval", action_kind, task_id),
            Self::RiskDenied {
                action_kind,
                task_id,
                reason,
                ..
            } => write!(f, "{} on {} denied: {}", action_kind, task_id, reason),
            Self::ExecutionFailed {
                action_kind,
                task_id,
                detail,
                ..
            } => write!(f, "{} on {} failed: {}", action_kind, task_id, detail),
        }
    }
}

/// One bounded execution cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub agent: AgentKind,
    /// Unique run identifier (UUID v4)
    pub run_id: String,
    /// Cycle number within the current work episode, inherited from the
    /// durable state and incremented once per run
    pub iteration: u32,
    /// Hard cap on the episode's self-dispatch chain
    pub max_iterations: u32,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    /// Tasks this run claimed
    pub claimed_task_ids: BTreeSet<TaskId>,
    /// Actions parked for approval during this run
    pub pending_action_ids: Vec<ActionId>,
    /// Structured reasons work could not finish
    pub blockers: Vec<Blocker>,
    /// Why the run stopped, when blocked
    pub block_reason: Option<BlockReason>,
}

impl Run {
    /// Fresh idle run
    pub fn new(agent: AgentKind, max_iterations: u32) -> Self {
        Self {
            agent,
            run_id: Uuid::new_v4().to_string(),
            iteration: 0,
            max_iterations,
            state: RunState::Idle,
            started_at: Utc::now(),
            claimed_task_ids: BTreeSet::new(),
            pending_action_ids: Vec::new(),
            blockers: Vec::new(),
            block_reason: None,
        }
    }

    /// Transition to `Working` on the first claim
    pub fn mark_working(&mut self) {
        if self.state == RunState::Idle {
            self.state = RunState::Working;
        }
    }

    /// Terminal: completion predicate held
    pub fn complete(&mut self) {
        self.state = RunState::Complete;
    }

    /// Terminal: stopped for `reason`
    pub fn block(&mut self, reason: BlockReason) {
        self.state = RunState::Blocked;
        self.block_reason = Some(reason);
    }

    pub fn add_blocker(&mut self, blocker: Blocker) {
        self.blockers.push(blocker);
    }

    /// Whether the episode budget permits another cycle after this one
    pub fn budget_remaining(&self) -> bool {
        self.iteration < self.max_iterations
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        format!(
            "agent={} run={} iter={}/{} state={} blockers={}",
            self.agent,
            &self.run_id[..8.min(self.run_id.len())],
            self.iteration,
            self.max_iterations,
            self.state,
            self.blockers.len(),
        )
    }
}

/// What `run(agent_id)` reports back to the external dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub agent: AgentKind,
    pub run_id: String,
    pub state: RunState,
    pub iterations_used: u32,
    pub blockers: Vec<Blocker>,
    pub block_reason: Option<BlockReason>,
    /// Whether this run asked the dispatcher for another cycle
    pub dispatch_requested: bool,
}

impl RunResult {
    pub fn from_run(run: &Run, dispatch_requested: bool) -> Self {
        Self {
            agent: run.agent,
            run_id: run.run_id.clone(),
            state: run.state,
            iterations_used: run.iteration,
            blockers: run.blockers.clone(),
            block_reason: run.block_reason.clone(),
            dispatch_requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_idle() {
        let run = Run::new(AgentKind::Support, 8);
        assert_eq!(run.state, RunState::Idle);
        assert_eq!(run.iteration, 0);
        assert!(run.budget_remaining());
    }

    #[test]
    fn test_mark_working_only_from_idle() {
        let mut run = Run::new(AgentKind::Support, 8);
        run.mark_working();
        assert_eq!(run.state, RunState::Working);

        run.complete();
        run.mark_working();
        assert_eq!(run.state, RunState::Complete);
    }

    #[test]
    fn test_block_records_reason() {
        let mut run = Run::new(AgentKind::Support, 2);
        run.block(BlockReason::IterationBudgetExhausted { max: 2 });
        assert_eq!(run.state, RunState::Blocked);
        assert!(run
            .block_reason
            .as_ref()
            .unwrap()
            .to_string()
            .contains("iteration budget"));
    }

    #[test]
    fn test_block_reason_serialization() {
        let reason = BlockReason::IterationBudgetExhausted { max: 5 };
        let json = serde_json::to_string(&reason).unwrap();
        assert!(json.contains("iteration_budget_exhausted"));

        let round_trip: BlockReason = serde_json::from_str(&json).unwrap();
        assert_eq!(round_trip, reason);
    }
}
