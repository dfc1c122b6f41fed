//! Orchestration core for an autonomous agent fleet
//!
//! Independent agents (support, ops, code, growth, finance, meta,
//! monitoring) pull work from shared priority queues and act within
//! declared autonomy boundaries. This crate is the deterministic core
//! that makes that safe:
//!
//! - **Task router**: strict priority tiers, FIFO within a tier, atomic
//!   compare-and-set claims so no task is ever dispatched twice
//! - **Run state machine**: one bounded cycle per invocation, with the
//!   cycle counter persisted so budgets survive process restarts and
//!   self-dispatch can never loop unboundedly
//! - **Risk gate**: static per-agent policy tables; anything above low
//!   risk waits for a human decision, forbidden kinds never execute
//! - **Alert engine**: threshold rules over rolling baselines with
//!   fingerprint deduplication and severity-based escalation routing
//! - **State store**: atomic whole-state replacement per agent partition
//!
//! Content generation, delivery, payments and other business logic live
//! outside the core behind the [`agent::Worker`] and
//! [`executor::ActionExecutor`] seams.
//!
//! # Usage
//!
//! ```bash
//! # Execute one bounded cycle for the support agent
//! orchestration run --agent support
//!
//! # Operator surfaces
//! orchestration status
//! orchestration approvals
//! orchestration approve <action-id> --by alice
//! orchestration emergency-stop
//! ```

pub mod action;
pub mod agent;
pub mod alerts;
pub mod approvals;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod executor;
pub mod risk;
pub mod router;
pub mod run;
pub mod state;
pub mod task;

// Re-export the task model
pub use task::{Impact, PriorityTier, Task, TaskId, TaskSource, TaskStatus};

// Re-export routing
pub use router::TaskRouter;

// Re-export the run state machine
pub use run::{BlockReason, Blocker, Run, RunContext, RunMachine, RunResult, RunState};

// Re-export agents and the planning seam
pub use agent::{AgentKind, RunBudget, Worker};

// Re-export actions and risk gating
pub use action::{Action, ActionId, ActionRequest};
pub use risk::{AuditEntry, AuditEvent, AuditLog, Authorization, PolicyTable, RiskGate, RiskTier};

// Re-export the human decision surface
pub use approvals::{ApprovalDecision, ApprovalQueue, ApprovalRequest, Decision};

// Re-export alerting
pub use alerts::{Alert, AlertEngine, Channel, DedupPolicy, RuleSet, Severity, ThresholdRule};

// Re-export persistence
pub use state::{AgentState, StateStore, StoreError};

// Re-export scheduling seams and controls
pub use dispatch::{ControlFlags, DispatchRequest, Dispatcher, NoopDispatcher, QueueDispatcher};
pub use executor::{ActionExecutor, ExecutionResult, LoggingExecutor, RetryPolicy};

// Re-export events
pub use events::{EventBus, OrchestratorEvent, SharedEventBus};

// Re-export errors and configuration
pub use config::OrchestratorConfig;
pub use error::{OrchestrationError, OrchestrationResult};
