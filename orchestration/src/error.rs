//! Orchestration error taxonomy
//!
//! Every variant here is recovered at the Run boundary and surfaced as a
//! structured blocker in the persisted state; none escape the `run` entry
//! point as an unhandled panic.

use thiserror::Error;

/// Result type alias for orchestration operations
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Errors that can occur inside the orchestration core
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// Another run already claimed the task. Not fatal; move to the next task.
    #[error("task {task_id} already claimed")]
    ClaimConflict { task_id: String },

    /// Task is not known to the router
    #[error("unknown task: {task_id}")]
    UnknownTask { task_id: String },

    /// A task with this id was already submitted
    #[error("duplicate task: {task_id}")]
    DuplicateTask { task_id: String },

    /// Action permanently blocked by policy. Logged; the run continues
    /// with other work.
    #[error("action {action_id} denied by policy: {reason}")]
    RiskDenied { action_id: String, reason: String },

    /// Action deferred until a human decision exists. Recorded as a
    /// blocker; the run continues.
    #[error("action {action_id} awaiting approval")]
    ApprovalPending { action_id: String },

    /// The self-dispatch chain hit its hard cap
    #[error("iteration budget ({max}) exhausted")]
    IterationBudgetExhausted { max: u32 },

    /// The run outlived its wall-clock budget
    #[error("wall clock budget ({budget_secs}s) exhausted")]
    WallClockExhausted { budget_secs: u64 },

    /// Unexpected failure in core logic. The run blocks with full context
    /// and nothing is committed.
    #[error("fatal: {message}")]
    Fatal { message: String },

    /// State store failure
    #[error("state store error: {0}")]
    Store(#[from] crate::state::StoreError),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestrationError {
    /// Create a fatal error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Whether the run can absorb this error and keep working on other
    /// tasks (as opposed to transitioning to Blocked).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ClaimConflict { .. } | Self::RiskDenied { .. } | Self::ApprovalPending { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrchestrationError::ClaimConflict {
            task_id: "t-1".into(),
        };
        assert!(err.to_string().contains("t-1"));

        let err = OrchestrationError::IterationBudgetExhausted { max: 8 };
        assert!(err.to_string().contains('8'));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(OrchestrationError::ClaimConflict {
            task_id: "t".into()
        }
        .is_recoverable());
        assert!(OrchestrationError::ApprovalPending {
            action_id: "a".into()
        }
        .is_recoverable());
        assert!(!OrchestrationError::fatal("boom").is_recoverable());
        assert!(!OrchestrationError::IterationBudgetExhausted { max: 3 }.is_recoverable());
    }
}
