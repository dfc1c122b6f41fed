//! Human decision surface
//!
//! A durable queue the core appends approval requests to and reads
//! resolved decisions from. Decisions are created by humans and are
//! read-only to the core once written: they append, they never mutate.
//!
//! Effective-decision semantics: a reject is permanent; an approve wins
//! over defers; defer and absence both leave the action pending, so a
//! stale request keeps surfacing as a blocker instead of being dropped.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionId};
use crate::agent::AgentKind;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::risk::RiskTier;
use crate::state::atomic_write_json;
use crate::task::TaskId;

/// A human's verdict on one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    Defer,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Defer => write!(f, "defer"),
        }
    }
}

/// A recorded human decision. Read-only to the core once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub action_id: ActionId,
    pub decision: Decision,
    pub decided_at: DateTime<Utc>,
    pub decided_by: String,
}

/// An action parked for human review, with everything needed to execute
/// it later without re-planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub action_id: ActionId,
    pub task_id: TaskId,
    pub agent: AgentKind,
    pub kind: String,
    pub risk_tier: RiskTier,
    pub payload: serde_json::Value,
    pub requested_at: DateTime<Utc>,
    /// Set once the core has acted on a terminal decision (executed the
    /// approved action, or recorded the rejection). Closed requests no
    /// longer appear in the pending queue.
    #[serde(default)]
    pub closed: bool,
}

impl ApprovalRequest {
    /// Park an action for review
    pub fn for_action(action: &Action) -> Self {
        Self {
            action_id: action.id.clone(),
            task_id: action.task_id.clone(),
            agent: action.agent,
            kind: action.kind.clone(),
            risk_tier: action.risk_tier,
            payload: action.payload.clone(),
            requested_at: Utc::now(),
            closed: false,
        }
    }

    /// Rebuild the parked action for re-authorization and execution.
    /// The action id is preserved so decisions keyed on it still match.
    pub fn to_action(&self) -> Action {
        Action {
            id: self.action_id.clone(),
            task_id: self.task_id.clone(),
            agent: self.agent,
            kind: self.kind.clone(),
            risk_tier: self.risk_tier,
            payload: self.payload.clone(),
            approval_id: None,
            created_at: self.requested_at,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    requests: Vec<ApprovalRequest>,
    decisions: Vec<ApprovalDecision>,
}

/// Durable approval queue, whole-document replacement on every write
pub struct ApprovalQueue {
    path: Option<PathBuf>,
    inner: Mutex<QueueState>,
}

impl ApprovalQueue {
    /// In-memory queue for tests and embedded use
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(QueueState::default()),
        }
    }

    /// Open or create a durable queue at `path`
    pub fn open(path: impl Into<PathBuf>) -> OrchestrationResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            QueueState::default()
        };
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(state),
        })
    }

    fn lock(&self) -> OrchestrationResult<std::sync::MutexGuard<'_, QueueState>> {
        self.inner
            .lock()
            .map_err(|_| OrchestrationError::fatal("approval queue lock poisoned"))
    }

    fn persist(&self, state: &QueueState) -> OrchestrationResult<()> {
        if let Some(path) = &self.path {
            atomic_write_json(path, state)?;
        }
        Ok(())
    }

    /// Append a request. Appending the same action twice is a no-op, so
    /// a blocked action re-surfaced every cycle does not grow the queue.
    pub fn request(&self, request: ApprovalRequest) -> OrchestrationResult<()> {
        let mut state = self.lock()?;
        if state
            .requests
            .iter()
            .any(|r| r.action_id == request.action_id)
        {
            return Ok(());
        }
        tracing::info!(
            action_id = %request.action_id,
            kind = %request.kind,
            tier = %request.risk_tier,
            "approval requested"
        );
        state.requests.push(request);
        self.persist(&state)
    }

    /// Record a human decision. Decisions accumulate; nothing is
    /// overwritten.
    pub fn record_decision(&self, decision: ApprovalDecision) -> OrchestrationResult<()> {
        let mut state = self.lock()?;
        tracing::info!(
            action_id = %decision.action_id,
            decision = %decision.decision,
            decided_by = %decision.decided_by,
            "approval decision recorded"
        );
        state.decisions.push(decision);
        self.persist(&state)
    }

    /// The effective decision for an action: any reject is permanent,
    /// otherwise any approve wins, otherwise the latest defer.
    pub fn effective_decision(&self, action_id: &str) -> Option<Decision> {
        let state = self.inner.lock().ok()?;
        let mut effective = None;
        for d in state.decisions.iter().filter(|d| d.action_id == action_id) {
            match d.decision {
                Decision::Reject => return Some(Decision::Reject),
                Decision::Approve => effective = Some(Decision::Approve),
                Decision::Defer => {
                    if effective.is_none() {
                        effective = Some(Decision::Defer);
                    }
                }
            }
        }
        effective
    }

    /// Who decided, for the audit trail
    pub fn decisions_for(&self, action_id: &str) -> Vec<ApprovalDecision> {
        self.inner
            .lock()
            .map(|s| {
                s.decisions
                    .iter()
                    .filter(|d| d.action_id == action_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Open requests for one agent, oldest first
    pub fn pending_for(&self, agent: AgentKind) -> Vec<ApprovalRequest> {
        self.inner
            .lock()
            .map(|s| {
                s.requests
                    .iter()
                    .filter(|r| !r.closed && r.agent == agent)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All open requests, for the operator surface
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        self.inner
            .lock()
            .map(|s| s.requests.iter().filter(|r| !r.closed).cloned().collect())
            .unwrap_or_default()
    }

    /// Close a request after the core has acted on its terminal
    /// decision. The request record itself is retained.
    pub fn close(&self, action_id: &str) -> OrchestrationResult<()> {
        let mut state = self.lock()?;
        if let Some(req) = state
            .requests
            .iter_mut()
            .find(|r| r.action_id == action_id)
        {
            req.closed = true;
        }
        self.persist(&state)
    }
}
