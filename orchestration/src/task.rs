//! Task model and derived priority tiers
//!
//! Tasks are immutable apart from `status` and `assigned_run_id`; the
//! router owns them until a run claims them. Priority tiers are never
//! stored; they are recomputed on every scheduling pass so a late tag
//! change reorders the queue without migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;

/// Unique identifier for tasks
pub type TaskId = String;

/// Where a task came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// A direct request from the founder/operator
    DirectRequest,
    /// A filed bug report
    BugReport,
    /// A ticket promoted from the backlog
    BacklogTicket,
    /// An inbound external event (webhook, inbox, monitor)
    ExternalEvent,
}

/// Coarse business impact of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    High,
    Normal,
}

/// Lifecycle status of a task. The router is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Blocked => write!(f, "blocked"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A unit of work routed to one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,
    /// Which agent's queue this task belongs to
    pub agent: AgentKind,
    /// Origin of the task
    pub source: TaskSource,
    /// Free-form tags (e.g. "urgent", "bug")
    pub tags: Vec<String>,
    /// Coarse impact classification
    pub impact: Impact,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Creation timestamp; FIFO anchor within a tier
    pub created_at: DateTime<Utc>,
    /// Run currently holding the claim, if any
    pub assigned_run_id: Option<String>,
}

impl Task {
    /// Create a new pending task
    pub fn new(id: impl Into<TaskId>, agent: AgentKind, source: TaskSource, impact: Impact) -> Self {
        Self {
            id: id.into(),
            agent,
            source,
            tags: Vec::new(),
            impact,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            assigned_run_id: None,
        }
    }

    /// Attach tags (builder style)
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Override the creation timestamp (builder style, used by ingestors
    /// replaying historical tickets)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Case-insensitive tag check
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn is_urgent(&self) -> bool {
        self.has_tag("urgent")
    }
}

/// Strict priority classes, highest first. Derived from the current task
/// attributes on every scheduling pass, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Direct request tagged urgent
    DirectUrgent,
    /// Direct request
    Direct,
    /// Tagged urgent/bug, or a filed bug report
    UrgentOrBug,
    /// Pending ticket with high impact
    HighImpact,
    /// Any other pending ticket
    Standard,
    /// Backlog; served only when everything above is empty
    Backlog,
}

impl PriorityTier {
    /// Classify a task. Pure over the task's current attributes.
    pub fn of(task: &Task) -> Self {
        match task.source {
            TaskSource::DirectRequest if task.is_urgent() => Self::DirectUrgent,
            TaskSource::DirectRequest => Self::Direct,
            TaskSource::BugReport => Self::UrgentOrBug,
            _ if task.is_urgent() || task.has_tag("bug") => Self::UrgentOrBug,
            TaskSource::BacklogTicket if task.impact == Impact::Normal => Self::Backlog,
            _ if task.impact == Impact::High => Self::HighImpact,
            _ => Self::Standard,
        }
    }

    /// Numeric rank, 1 = highest priority
    pub fn rank(&self) -> u8 {
        match self {
            Self::DirectUrgent => 1,
            Self::Direct => 2,
            Self::UrgentOrBug => 3,
            Self::HighImpact => 4,
            Self::Standard => 5,
            Self::Backlog => 6,
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectUrgent => write!(f, "direct_urgent"),
            Self::Direct => write!(f, "direct"),
            Self::UrgentOrBug => write!(f, "urgent_or_bug"),
            Self::HighImpact => write!(f, "high_impact"),
            Self::Standard => write!(f, "standard"),
            Self::Backlog => write!(f, "backlog"),
        }
    }
}
