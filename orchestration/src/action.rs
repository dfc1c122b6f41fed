//! Actions: side-effecting operations proposed by workers
//!
//! A worker proposes [`ActionRequest`]s; the risk gate classifies each
//! into an [`Action`] with a risk tier before anything executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::AgentKind;
use crate::risk::RiskTier;
use crate::task::TaskId;

/// Unique identifier for actions
pub type ActionId = String;

/// A proposed side effect, pre-classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Operation kind, matched against the policy table
    /// (e.g. "send_email", "refund", "create_pr")
    pub kind: String,
    /// Operation arguments, passed through to the executor and the audit log
    pub payload: serde_json::Value,
}

impl ActionRequest {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// A classified action bound to a task and a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique action identifier (UUID v4)
    pub id: ActionId,
    /// Task this action works toward resolving
    pub task_id: TaskId,
    /// Agent proposing the action
    pub agent: AgentKind,
    /// Operation kind
    pub kind: String,
    /// Risk tier assigned by the policy table
    pub risk_tier: RiskTier,
    /// Operation arguments
    pub payload: serde_json::Value,
    /// Set once a human approves; required for any tier above low
    pub approval_id: Option<String>,
    /// When the action was classified
    pub created_at: DateTime<Utc>,
}

impl Action {
    /// Bind a classified request to a task
    pub fn from_request(
        request: ActionRequest,
        task_id: impl Into<TaskId>,
        agent: AgentKind,
        risk_tier: RiskTier,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            agent,
            kind: request.kind,
            risk_tier,
            payload: request.payload,
            approval_id: None,
            created_at: Utc::now(),
        }
    }

    /// Compact summary for logging
    pub fn summary(&self) -> String {
        format!(
            "action={} kind={} tier={} task={}",
            self.id, self.kind, self.risk_tier, self.task_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_request_binds_task() {
        let req = ActionRequest::new("send_email", json!({"to": "a@example.com"}));
        let action = Action::from_request(req, "t-9", AgentKind::Support, RiskTier::Low);
        assert_eq!(action.task_id, "t-9");
        assert_eq!(action.kind, "send_email");
        assert!(action.approval_id.is_none());
        assert!(!action.id.is_empty());
    }
}
