//! Risk gate: classification and authorization of proposed actions
//!
//! Authorization is deterministic and idempotent: the verdict is a pure
//! function of the action's tier and the recorded human decisions.
//! Repeated checks against the same decision state return the same
//! result. Every verdict is appended to the audit log with the full
//! action payload.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionRequest};
use crate::agent::AgentKind;
use crate::approvals::{ApprovalQueue, Decision};
use crate::risk::audit::{AuditEntry, AuditEvent, AuditLog};
use crate::risk::policy::{PolicyTable, RiskTier};
use crate::task::TaskId;

/// Verdict on whether an action may execute now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Authorization {
    /// Execute autonomously
    Allowed,
    /// Park until a human decision exists
    PendingApproval,
    /// Never execute
    Denied { reason: String },
}

impl Authorization {
    /// Stable label for logs and the audit trail
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::PendingApproval => "pending_approval",
            Self::Denied { .. } => "denied",
        }
    }
}

/// The policy engine deciding whether an action may execute autonomously
pub struct RiskGate {
    policy: PolicyTable,
    audit: AuditLog,
}

impl RiskGate {
    /// Gate with the standing fleet policy and an in-memory audit log
    pub fn new() -> Self {
        Self {
            policy: PolicyTable::fleet_default(),
            audit: AuditLog::in_memory(),
        }
    }

    /// Gate with an explicit policy table and audit sink
    pub fn with_policy(policy: PolicyTable, audit: AuditLog) -> Self {
        Self { policy, audit }
    }

    /// Access the audit log (in-memory sinks expose recorded entries)
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Classify a proposed request and bind it to its task. The tier is
    /// a pure policy lookup; the audit append is the only side effect.
    pub fn classify(
        &self,
        agent: AgentKind,
        task_id: &TaskId,
        request: ActionRequest,
    ) -> Action {
        let tier = self.policy.classify(agent, &request.kind, &request.payload);
        let action = Action::from_request(request, task_id.clone(), agent, tier);
        tracing::debug!(action = %action.summary(), "classified");
        self.append_audit(&action, AuditEvent::Classified { tier });
        action
    }

    /// Authorize an action against the recorded decisions.
    ///
    /// Truth table:
    /// - low: allowed
    /// - forbidden: denied, decisions are ignored
    /// - medium/high + approve: allowed
    /// - medium/high + reject: denied permanently
    /// - medium/high + defer or no decision: pending approval
    pub fn authorize(&self, action: &Action, approvals: &ApprovalQueue) -> Authorization {
        let verdict = match action.risk_tier {
            RiskTier::Low => Authorization::Allowed,
            RiskTier::Forbidden => Authorization::Denied {
                reason: format!("kind '{}' is forbidden by policy", action.kind),
            },
            RiskTier::Medium | RiskTier::High => {
                match approvals.effective_decision(&action.id) {
                    Some(Decision::Approve) => Authorization::Allowed,
                    Some(Decision::Reject) => {
                        let by = approvals
                            .decisions_for(&action.id)
                            .iter()
                            .find(|d| d.decision == Decision::Reject)
                            .map(|d| d.decided_by.clone())
                            .unwrap_or_else(|| "unknown".into());
                        Authorization::Denied {
                            reason: format!("rejected by {}", by),
                        }
                    }
                    Some(Decision::Defer) | None => Authorization::PendingApproval,
                }
            }
        };

        tracing::debug!(action = %action.summary(), verdict = verdict.label(), "authorized");
        self.append_audit(
            action,
            AuditEvent::Authorized {
                outcome: verdict.label().to_string(),
            },
        );
        verdict
    }

    fn append_audit(&self, action: &Action, event: AuditEvent) {
        let entry = AuditEntry {
            at: chrono::Utc::now(),
            agent: action.agent,
            action_id: action.id.clone(),
            kind: action.kind.clone(),
            event,
            payload: action.payload.clone(),
        };
        if let Err(err) = self.audit.append(entry) {
            // The verdict stands even if the log write fails
            tracing::warn!(error = %err, action_id = %action.id, "audit append failed");
        }
    }
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approvals::ApprovalDecision;
    use serde_json::json;

    fn gate() -> RiskGate {
        RiskGate::new()
    }

    fn approve(queue: &ApprovalQueue, action_id: &str) {
        queue
            .record_decision(ApprovalDecision {
                action_id: action_id.into(),
                decision: Decision::Approve,
                decided_at: chrono::Utc::now(),
                decided_by: "founder".into(),
            })
            .unwrap();
    }

    #[test]
    fn test_low_is_allowed_without_decision() {
        let gate = gate();
        let approvals = ApprovalQueue::in_memory();
        let action = gate.classify(
            AgentKind::Support,
            &"t-1".to_string(),
            ActionRequest::new("send_email", json!({})),
        );
        assert_eq!(action.risk_tier, RiskTier::Low);
        assert_eq!(gate.authorize(&action, &approvals), Authorization::Allowed);
    }

    #[test]
    fn test_medium_needs_approval_round_trip() {
        let gate = gate();
        let approvals = ApprovalQueue::in_memory();
        let action = gate.classify(
            AgentKind::Finance,
            &"t-1".to_string(),
            ActionRequest::new("refund", json!({"amount": 42})),
        );

        assert_eq!(
            gate.authorize(&action, &approvals),
            Authorization::PendingApproval
        );

        approve(&approvals, &action.id);
        assert_eq!(gate.authorize(&action, &approvals), Authorization::Allowed);
        // Idempotent under repeated checks
        assert_eq!(gate.authorize(&action, &approvals), Authorization::Allowed);
    }

    #[test]
    fn test_forbidden_ignores_adversarial_approval() {
        let gate = gate();
        let approvals = ApprovalQueue::in_memory();
        let action = gate.classify(
            AgentKind::Code,
            &"t-1".to_string(),
            ActionRequest::new("merge_main", json!({})),
        );
        assert_eq!(action.risk_tier, RiskTier::Forbidden);

        approve(&approvals, &action.id);
        assert!(matches!(
            gate.authorize(&action, &approvals),
            Authorization::Denied { .. }
        ));
    }

    #[test]
    fn test_every_verdict_is_audited() {
        let gate = gate();
        let approvals = ApprovalQueue::in_memory();
        let action = gate.classify(
            AgentKind::Finance,
            &"t-1".to_string(),
            ActionRequest::new("refund", json!({"amount": 7})),
        );
        gate.authorize(&action, &approvals);
        gate.authorize(&action, &approvals);

        // 1 classification + 2 authorizations, payload carried verbatim
        let entries = gate.audit().entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.payload == json!({"amount": 7})));
    }
}
