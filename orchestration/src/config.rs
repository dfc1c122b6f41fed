//! Orchestrator configuration
//!
//! Defaults in code, optionally overridden by a TOML file and then by
//! environment variables. Accepted boolean env values are "1", "true"
//! or "yes" (case-insensitive).
//!
//! | Variable | Effect |
//! |---|---|
//! | `ORCH_DATA_DIR` | Rebase all data paths under this directory |
//! | `ORCH_MAX_ITERATIONS` | Cap every agent's episode budget |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::{AgentKind, RunBudget};
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::executor::RetryPolicy;

/// Top-level configuration for the orchestration core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory holding per-agent state partitions
    pub state_dir: PathBuf,
    /// Durable task queue document
    pub tasks_path: PathBuf,
    /// Durable approval queue document
    pub approvals_path: PathBuf,
    /// Append-only risk audit log
    pub audit_log_path: PathBuf,
    /// Emergency stop marker file
    pub stop_file: PathBuf,
    /// Per-agent budget overrides; agents not listed use their defaults
    pub budgets: BTreeMap<AgentKind, RunBudget>,
    /// Executor retry policy
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::default_at("orchestration-data")
    }
}

impl OrchestratorConfig {
    /// Configuration rooted at `root`
    pub fn default_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            state_dir: root.join("state"),
            tasks_path: root.join("tasks.json"),
            approvals_path: root.join("approvals.json"),
            audit_log_path: root.join("audit.jsonl"),
            stop_file: root.join("STOP"),
            budgets: BTreeMap::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Parse a TOML config file
    pub fn from_toml_file(path: &Path) -> OrchestrationResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| OrchestrationError::fatal(format!("config parse: {}", e)))
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> OrchestrationResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `ORCH_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("ORCH_DATA_DIR") {
            *self = Self {
                budgets: std::mem::take(&mut self.budgets),
                retry: self.retry,
                ..Self::default_at(dir)
            };
        }
        if let Some(max) = std::env::var("ORCH_MAX_ITERATIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            for agent in AgentKind::all() {
                let mut budget = self.budget_for(*agent);
                budget.max_iterations = budget.max_iterations.min(max);
                self.budgets.insert(*agent, budget);
            }
        }
    }

    /// Effective budget for an agent
    pub fn budget_for(&self, agent: AgentKind) -> RunBudget {
        self.budgets
            .get(&agent)
            .copied()
            .unwrap_or_else(|| agent.default_budget())
    }
}
