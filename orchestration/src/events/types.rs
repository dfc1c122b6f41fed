//! Orchestrator event types
//!
//! Everything observable about a run is published as one of these,
//! including the explicit self-dispatch record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::ActionId;
use crate::agent::AgentKind;
use crate::alerts::Severity;
use crate::risk::RiskTier;
use crate::task::{PriorityTier, TaskId};

/// All orchestrator events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A run began a cycle
    RunStarted {
        agent: AgentKind,
        run_id: String,
        iteration: u32,
        timestamp: DateTime<Utc>,
    },

    /// A task was claimed by a run
    TaskClaimed {
        agent: AgentKind,
        run_id: String,
        task_id: TaskId,
        tier: PriorityTier,
        timestamp: DateTime<Utc>,
    },

    /// An action passed or failed the risk gate
    ActionAuthorized {
        action_id: ActionId,
        kind: String,
        risk_tier: RiskTier,
        verdict: String,
        timestamp: DateTime<Utc>,
    },

    /// An executor finished an allowed action
    ActionExecuted {
        action_id: ActionId,
        kind: String,
        success: bool,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// An action was parked for human review
    ApprovalRequested {
        action_id: ActionId,
        agent: AgentKind,
        kind: String,
        risk_tier: RiskTier,
        timestamp: DateTime<Utc>,
    },

    /// A run finished with its queue drained
    RunCompleted {
        agent: AgentKind,
        run_id: String,
        iterations_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A run stopped before its work was done
    RunBlocked {
        agent: AgentKind,
        run_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A run explicitly asked the dispatcher for another cycle
    SelfDispatchRequested {
        agent: AgentKind,
        run_id: String,
        iteration: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The alert engine surfaced a new alert
    AlertRaised {
        fingerprint: String,
        metric: String,
        component: String,
        severity: Severity,
        timestamp: DateTime<Utc>,
    },

    /// The emergency stop was engaged
    EmergencyStop { timestamp: DateTime<Utc> },
}

impl OrchestratorEvent {
    /// Stable label for metrics and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::TaskClaimed { .. } => "task_claimed",
            Self::ActionAuthorized { .. } => "action_authorized",
            Self::ActionExecuted { .. } => "action_executed",
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunBlocked { .. } => "run_blocked",
            Self::SelfDispatchRequested { .. } => "self_dispatch_requested",
            Self::AlertRaised { .. } => "alert_raised",
            Self::EmergencyStop { .. } => "emergency_stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = OrchestratorEvent::SelfDispatchRequested {
            agent: AgentKind::Support,
            run_id: "r-1".into(),
            iteration: 2,
            reason: "queue not drained".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"self_dispatch_requested\""));
        assert_eq!(event.event_type(), "self_dispatch_requested");
    }
}
