//! Task router: priority-ordered dispatch with atomic claims
//!
//! The router owns every task until a run claims it and is the source of
//! truth for task status. Claims are compare-and-set under a single
//! lock: a task is handed out only while `status == pending`, and the
//! winning claim flips it to `in_progress` in the same critical section,
//! so two concurrent runs can never claim the same task.
//!
//! Priority is recomputed on every pass (see [`PriorityTier`]); while a
//! direct request is pending for an agent, every lower tier is invisible
//! to that agent until the direct stream is exhausted.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::state::atomic_write_json;
use crate::task::{PriorityTier, Task, TaskId, TaskSource, TaskStatus};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RouterInner {
    tasks: BTreeMap<TaskId, Task>,
}

/// Shared task queue across the fleet
pub struct TaskRouter {
    path: Option<PathBuf>,
    inner: Mutex<RouterInner>,
}

impl TaskRouter {
    /// In-memory router for tests and embedded use
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(RouterInner::default()),
        }
    }

    /// Open or create a durable router backed by a JSON document
    pub fn open(path: impl Into<PathBuf>) -> OrchestrationResult<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            RouterInner::default()
        };
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> OrchestrationResult<std::sync::MutexGuard<'_, RouterInner>> {
        self.inner
            .lock()
            .map_err(|_| OrchestrationError::fatal("router lock poisoned"))
    }

    fn persist(&self, inner: &RouterInner) -> OrchestrationResult<()> {
        if let Some(path) = &self.path {
            atomic_write_json(path, inner)?;
        }
        Ok(())
    }

    /// Add a task to the queue. Duplicate ids are rejected.
    pub fn submit(&self, task: Task) -> OrchestrationResult<()> {
        let mut inner = self.lock()?;
        if inner.tasks.contains_key(&task.id) {
            return Err(OrchestrationError::DuplicateTask {
                task_id: task.id.clone(),
            });
        }
        tracing::info!(
            task_id = %task.id,
            agent = %task.agent,
            tier = %PriorityTier::of(&task),
            "task submitted"
        );
        inner.tasks.insert(task.id.clone(), task);
        self.persist(&inner)
    }

    /// Claim the highest-priority pending task for `agent`, marking it
    /// `in_progress` for `run_id` atomically with the selection.
    pub fn next(&self, agent: AgentKind, run_id: &str) -> Option<Task> {
        let mut inner = self.lock().ok()?;

        // While a direct request is pending, it is the only visible stream
        let direct_window = inner
            .tasks
            .values()
            .any(|t| {
                t.agent == agent
                    && t.status == TaskStatus::Pending
                    && t.source == TaskSource::DirectRequest
            });

        let best_id = inner
            .tasks
            .values()
            .filter(|t| t.agent == agent && t.status == TaskStatus::Pending)
            .filter(|t| !direct_window || t.source == TaskSource::DirectRequest)
            .min_by_key(|t| (PriorityTier::of(t), t.created_at, t.id.clone()))
            .map(|t| t.id.clone())?;

        let task = inner.tasks.get_mut(&best_id)?;
        task.status = TaskStatus::InProgress;
        task.assigned_run_id = Some(run_id.to_string());
        let claimed = task.clone();

        if let Err(err) = self.persist(&inner) {
            tracing::warn!(error = %err, "router persist failed after claim");
        }
        tracing::debug!(task_id = %claimed.id, run_id, "task claimed");
        Some(claimed)
    }

    /// Claim a specific task. Fails with `ClaimConflict` unless the task
    /// is currently pending.
    pub fn claim(&self, task_id: &str, run_id: &str) -> OrchestrationResult<Task> {
        let mut inner = self.lock()?;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| OrchestrationError::UnknownTask {
                task_id: task_id.to_string(),
            })?;
        if task.status != TaskStatus::Pending {
            return Err(OrchestrationError::ClaimConflict {
                task_id: task_id.to_string(),
            });
        }
        task.status = TaskStatus::InProgress;
        task.assigned_run_id = Some(run_id.to_string());
        let claimed = task.clone();
        self.persist(&inner)?;
        Ok(claimed)
    }

    fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        clear_claim: bool,
    ) -> OrchestrationResult<()> {
        let mut inner = self.lock()?;
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| OrchestrationError::UnknownTask {
                task_id: task_id.to_string(),
            })?;
        task.status = status;
        if clear_claim {
            task.assigned_run_id = None;
        }
        self.persist(&inner)
    }

    /// Return a claimed task to the pending queue (run died or stopped
    /// before processing it)
    pub fn release(&self, task_id: &str) -> OrchestrationResult<()> {
        tracing::debug!(task_id, "task released");
        self.set_status(task_id, TaskStatus::Pending, true)
    }

    /// Mark a task resolved
    pub fn complete(&self, task_id: &str) -> OrchestrationResult<()> {
        tracing::debug!(task_id, "task done");
        self.set_status(task_id, TaskStatus::Done, true)
    }

    /// Mark a task blocked (denied action or awaiting approval)
    pub fn block(&self, task_id: &str) -> OrchestrationResult<()> {
        tracing::debug!(task_id, "task blocked");
        self.set_status(task_id, TaskStatus::Blocked, true)
    }

    /// Current task record
    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.inner.lock().ok()?.tasks.get(task_id).cloned()
    }

    /// Whether `agent` has pending work
    pub fn has_pending(&self, agent: AgentKind) -> bool {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .tasks
                    .values()
                    .any(|t| t.agent == agent && t.status == TaskStatus::Pending)
            })
            .unwrap_or(false)
    }

    /// Count of pending tasks for `agent`
    pub fn pending_count(&self, agent: AgentKind) -> usize {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .tasks
                    .values()
                    .filter(|t| t.agent == agent && t.status == TaskStatus::Pending)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Full queue snapshot for observability tooling
    pub fn snapshot(&self) -> Vec<Task> {
        self.inner
            .lock()
            .map(|inner| inner.tasks.values().cloned().collect())
            .unwrap_or_default()
    }
}
