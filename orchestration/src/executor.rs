//! External action executors
//!
//! Content generation, delivery, payments and the like live outside the
//! core behind this seam. Executors are treated as untrusted: bounded
//! retries on transient failure, then the action is recorded as blocked
//! with the final detail. Calls are fire-and-forget with retry, never
//! open-ended blocking inside the iteration budget.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::Action;

/// What an executor reported back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub detail: String,
    /// Whether a failure is worth retrying
    #[serde(default)]
    pub retryable: bool,
}

impl ExecutionResult {
    /// Successful execution
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
            retryable: false,
        }
    }

    /// Transient failure; eligible for retry
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
            retryable: true,
        }
    }

    /// Permanent failure; retrying will not help
    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
            retryable: false,
        }
    }
}

/// Seam to the outside world
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> ExecutionResult;
}

/// Bounded retry parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

/// Execute with bounded retries on transient failure. The final result
/// is returned either way; the caller records failures as blockers.
pub async fn execute_with_retry(
    executor: &dyn ActionExecutor,
    action: &Action,
    policy: RetryPolicy,
) -> ExecutionResult {
    let attempts = policy.max_attempts.max(1);
    let mut last = ExecutionResult::permanent("no attempts made");

    for attempt in 1..=attempts {
        last = executor.execute(action).await;
        if last.success {
            return last;
        }
        tracing::warn!(
            action_id = %action.id,
            kind = %action.kind,
            attempt,
            detail = %last.detail,
            "execution failed"
        );
        if !last.retryable || attempt == attempts {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(
            policy.backoff_ms * u64::from(attempt),
        ))
        .await;
    }
    last
}

/// Executor that logs the action and reports success. Used by the CLI
/// when no real executors are wired in.
pub struct LoggingExecutor;

#[async_trait]
impl ActionExecutor for LoggingExecutor {
    async fn execute(&self, action: &Action) -> ExecutionResult {
        tracing::info!(action = %action.summary(), "executing (logging only)");
        ExecutionResult::ok("logged")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;
    use crate::risk::RiskTier;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyExecutor {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl ActionExecutor for FlakyExecutor {
        async fn execute(&self, _action: &Action) -> ExecutionResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                ExecutionResult::ok("sent")
            } else {
                ExecutionResult::transient("connection reset")
            }
        }
    }

    fn action() -> Action {
        Action::from_request(
            crate::action::ActionRequest::new("send_email", serde_json::json!({})),
            "t-1",
            AgentKind::Support,
            RiskTier::Low,
        )
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let executor = FlakyExecutor {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        };
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_ms: 1,
        };
        let result = execute_with_retry(&executor, &action(), policy).await;
        assert!(result.success);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let executor = FlakyExecutor {
            calls: AtomicU32::new(0),
            succeed_on: 10,
        };
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_ms: 1,
        };
        let result = execute_with_retry(&executor, &action(), policy).await;
        assert!(!result.success);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        struct AlwaysPermanent(AtomicU32);

        #[async_trait]
        impl ActionExecutor for AlwaysPermanent {
            async fn execute(&self, _action: &Action) -> ExecutionResult {
                self.0.fetch_add(1, Ordering::SeqCst);
                ExecutionResult::permanent("address does not exist")
            }
        }

        let executor = AlwaysPermanent(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_ms: 1,
        };
        let result = execute_with_retry(&executor, &action(), policy).await;
        assert!(!result.success);
        assert_eq!(executor.0.load(Ordering::SeqCst), 1);
    }
}
