//! Agent roles and per-role run budgets
//!
//! The fleet is a fixed set of independent agents. Each role carries a
//! default budget bounding one work episode: how many self-dispatched
//! cycles it may chain, how long a single cycle may hold the wall clock,
//! and how many tasks it may claim per cycle.
//!
//! Anything judgment-based (what to do about a claimed task) lives behind
//! the [`Worker`] trait; the core calls it but never implements it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::ActionRequest;
use crate::error::OrchestrationResult;
use crate::run::Run;
use crate::task::Task;

/// Agent roles in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Inbound customer requests and replies
    Support,
    /// Infrastructure and operational housekeeping
    Ops,
    /// Bug fixes and small code changes
    Code,
    /// Outreach and content scheduling
    Growth,
    /// Invoicing, refunds, reconciliation
    Finance,
    /// Fleet oversight and reporting
    Meta,
    /// Metric ingestion and anomaly detection
    Monitoring,
}

impl AgentKind {
    /// All defined roles
    pub fn all() -> &'static [AgentKind] {
        &[
            Self::Support,
            Self::Ops,
            Self::Code,
            Self::Growth,
            Self::Finance,
            Self::Meta,
            Self::Monitoring,
        ]
    }

    /// Default budget for one work episode of this role.
    ///
    /// Code runs get fewer, longer cycles with small batches (small,
    /// reviewable changes); high-volume queues get more, shorter cycles.
    pub fn default_budget(&self) -> RunBudget {
        match self {
            Self::Support => RunBudget {
                max_iterations: 8,
                max_wall_clock_secs: 600,
                max_batch: 5,
            },
            Self::Ops => RunBudget {
                max_iterations: 6,
                max_wall_clock_secs: 900,
                max_batch: 3,
            },
            Self::Code => RunBudget {
                max_iterations: 5,
                max_wall_clock_secs: 1800,
                max_batch: 2,
            },
            Self::Growth => RunBudget {
                max_iterations: 6,
                max_wall_clock_secs: 600,
                max_batch: 4,
            },
            Self::Finance => RunBudget {
                max_iterations: 4,
                max_wall_clock_secs: 600,
                max_batch: 3,
            },
            Self::Meta => RunBudget {
                max_iterations: 3,
                max_wall_clock_secs: 300,
                max_batch: 2,
            },
            Self::Monitoring => RunBudget {
                max_iterations: 10,
                max_wall_clock_secs: 300,
                max_batch: 8,
            },
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Support => write!(f, "support"),
            Self::Ops => write!(f, "ops"),
            Self::Code => write!(f, "code"),
            Self::Growth => write!(f, "growth"),
            Self::Finance => write!(f, "finance"),
            Self::Meta => write!(f, "meta"),
            Self::Monitoring => write!(f, "monitoring"),
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "support" => Ok(Self::Support),
            "ops" => Ok(Self::Ops),
            "code" => Ok(Self::Code),
            "growth" => Ok(Self::Growth),
            "finance" => Ok(Self::Finance),
            "meta" => Ok(Self::Meta),
            "monitoring" => Ok(Self::Monitoring),
            other => Err(format!("unknown agent: {}", other)),
        }
    }
}

/// Budget limits for one work episode of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBudget {
    /// Maximum self-dispatched cycles before the episode hard-stops
    pub max_iterations: u32,
    /// Wall-clock budget for a single cycle, in seconds
    pub max_wall_clock_secs: u64,
    /// Maximum tasks claimed per cycle
    pub max_batch: usize,
}

/// Agent-specific planning and judgment, injected into the run machine.
///
/// `plan` is the only place generative or otherwise non-deterministic
/// behavior is allowed to live. The core treats its output as untrusted
/// proposals: every returned request goes through the risk gate before
/// anything executes.
#[async_trait]
pub trait Worker: Send {
    /// Produce the side-effecting actions needed to resolve a claimed task.
    ///
    /// An empty vector means the task is resolved by observation alone.
    /// An error is treated as fatal for the current run.
    async fn plan(&mut self, task: &Task) -> OrchestrationResult<Vec<ActionRequest>>;

    /// Agent-specific refinement of the completion predicate. The core
    /// predicate (queue drained, every attempted action executed or
    /// recorded as blocked) always applies; this hook can only veto.
    fn is_satisfied(&self, run: &Run) -> bool {
        let _ = run;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets_are_bounded() {
        for agent in AgentKind::all() {
            let budget = agent.default_budget();
            assert!(budget.max_iterations > 0, "{} has no iterations", agent);
            assert!(budget.max_batch > 0, "{} has no batch", agent);
            assert!(budget.max_wall_clock_secs > 0, "{} has no wall clock", agent);
        }
    }

    #[test]
    fn test_agent_round_trip() {
        for agent in AgentKind::all() {
            let parsed: AgentKind = agent.to_string().parse().unwrap();
            assert_eq!(parsed, *agent);
        }
        assert!("founder".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_agent_serde_snake_case() {
        let json = serde_json::to_string(&AgentKind::Monitoring).unwrap();
        assert_eq!(json, "\"monitoring\"");
    }
}
