//! The bounded cycle driver
//!
//! `run(agent)` executes exactly one cycle: replay approvals decided
//! since the last cycle, claim a batch of tasks, gate and execute the
//! worker's proposed actions, commit the whole state atomically, then
//! decide whether to request another cycle through the dispatcher.
//!
//! Termination is structural: the cycle counter lives in the durable
//! state, a run only ever asks for one continuation, and it never asks
//! once the counter reaches the episode budget. Every stop is reported
//! with a reason, so "nothing left to do" and "stuck" are never
//! ambiguous.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::action::Action;
use crate::agent::{AgentKind, RunBudget, Worker};
use crate::approvals::{ApprovalQueue, ApprovalRequest};
use crate::dispatch::{ControlFlags, Dispatcher, NoopDispatcher};
use crate::events::{EventBus, OrchestratorEvent, SharedEventBus};
use crate::executor::{execute_with_retry, ActionExecutor, LoggingExecutor, RetryPolicy};
use crate::risk::{Authorization, RiskGate};
use crate::router::TaskRouter;
use crate::run::state::{BlockReason, Blocker, Run, RunResult, RunState};
use crate::state::StateStore;
use crate::task::PriorityTier;

/// Everything a run needs, injected once
pub struct RunContext {
    pub router: Arc<TaskRouter>,
    pub gate: Arc<RiskGate>,
    pub approvals: Arc<ApprovalQueue>,
    pub store: Arc<StateStore>,
    pub executor: Arc<dyn ActionExecutor>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub controls: ControlFlags,
    pub events: SharedEventBus,
    pub retry: RetryPolicy,
}

impl RunContext {
    /// Context with inert defaults for the outward seams (logging
    /// executor, dropped dispatch requests, fresh controls and bus).
    pub fn new(
        router: Arc<TaskRouter>,
        gate: Arc<RiskGate>,
        approvals: Arc<ApprovalQueue>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            router,
            gate,
            approvals,
            store,
            executor: Arc::new(LoggingExecutor),
            dispatcher: Arc::new(NoopDispatcher),
            controls: ControlFlags::new(),
            events: EventBus::new().shared(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives bounded cycles for the fleet
pub struct RunMachine {
    ctx: RunContext,
    budget_overrides: BTreeMap<AgentKind, RunBudget>,
    /// Guard enforcing one run per agent at a time within this process
    active: Mutex<std::collections::BTreeSet<AgentKind>>,
}

struct ActiveGuard<'a> {
    machine: &'a RunMachine,
    agent: AgentKind,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.machine.active.lock() {
            active.remove(&self.agent);
        }
    }
}

impl RunMachine {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx,
            budget_overrides: BTreeMap::new(),
            active: Mutex::new(std::collections::BTreeSet::new()),
        }
    }

    /// Override the budget for one agent
    pub fn with_budget(mut self, agent: AgentKind, budget: RunBudget) -> Self {
        self.budget_overrides.insert(agent, budget);
        self
    }

    fn budget_for(&self, agent: AgentKind) -> RunBudget {
        self.budget_overrides
            .get(&agent)
            .copied()
            .unwrap_or_else(|| agent.default_budget())
    }

    fn try_acquire(&self, agent: AgentKind) -> Option<ActiveGuard<'_>> {
        let mut active = self.active.lock().ok()?;
        if !active.insert(agent) {
            return None;
        }
        Some(ActiveGuard {
            machine: self,
            agent,
        })
    }

    fn publish_authorized(&self, action: &Action, verdict: &Authorization) {
        self.ctx.events.publish(OrchestratorEvent::ActionAuthorized {
            action_id: action.id.clone(),
            kind: action.kind.clone(),
            risk_tier: action.risk_tier,
            verdict: verdict.label().to_string(),
            timestamp: Utc::now(),
        });
    }

    fn publish_terminal(&self, run: &Run) {
        match run.state {
            RunState::Complete => {
                tracing::info!(run = %run.summary(), "run complete");
                self.ctx.events.publish(OrchestratorEvent::RunCompleted {
                    agent: run.agent,
                    run_id: run.run_id.clone(),
                    iterations_used: run.iteration,
                    timestamp: Utc::now(),
                });
            }
            RunState::Blocked => {
                let reason = run
                    .block_reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "unknown".into());
                tracing::warn!(run = %run.summary(), %reason, "run blocked");
                self.ctx.events.publish(OrchestratorEvent::RunBlocked {
                    agent: run.agent,
                    run_id: run.run_id.clone(),
                    reason,
                    timestamp: Utc::now(),
                });
            }
            _ => {}
        }
    }

    /// Execute one bounded cycle for `agent`.
    ///
    /// Never panics and never leaks an error: every failure mode ends as
    /// a blocked result with the reason recorded. A fatal error commits
    /// nothing; the previous durable state stays authoritative.
    pub async fn run(&self, agent: AgentKind, worker: &mut dyn Worker) -> RunResult {
        let budget = self.budget_for(agent);
        let mut run = Run::new(agent, budget.max_iterations);

        let _guard = match self.try_acquire(agent) {
            Some(guard) => guard,
            None => {
                run.block(BlockReason::FatalError {
                    message: "another run is active for this agent".into(),
                });
                self.publish_terminal(&run);
                return RunResult::from_run(&run, false);
            }
        };

        let mut durable = match self.ctx.store.load(agent) {
            Ok(state) => state,
            Err(err) => {
                run.block(BlockReason::FatalError {
                    message: format!("state load failed: {}", err),
                });
                self.publish_terminal(&run);
                return RunResult::from_run(&run, false);
            }
        };

        run.iteration = durable.iteration + 1;
        tracing::info!(run = %run.summary(), "run started");
        self.ctx.events.publish(OrchestratorEvent::RunStarted {
            agent,
            run_id: run.run_id.clone(),
            iteration: run.iteration,
            timestamp: Utc::now(),
        });

        if self.ctx.controls.emergency_stopped() {
            run.block(BlockReason::EmergencyStop);
            self.ctx.events.publish(OrchestratorEvent::EmergencyStop {
                timestamp: Utc::now(),
            });
            self.publish_terminal(&run);
            return RunResult::from_run(&run, false);
        }

        let deadline =
            run.started_at + chrono::Duration::seconds(budget.max_wall_clock_secs as i64);
        let mut halted = false;
        let mut timed_out = false;
        let mut fatal: Option<String> = None;
        let mut tasks_resolved = 0u32;
        let mut actions_executed = 0u32;

        // ── Replay approvals decided since the last cycle ────────────────
        for request in self.ctx.approvals.pending_for(agent) {
            if self.ctx.controls.emergency_stopped() {
                halted = true;
                break;
            }
            if Utc::now() > deadline {
                timed_out = true;
                break;
            }

            let action = request.to_action();
            let verdict = self.ctx.gate.authorize(&action, &self.ctx.approvals);
            self.publish_authorized(&action, &verdict);

            match verdict {
                Authorization::Allowed => {
                    run.mark_working();
                    let result =
                        execute_with_retry(self.ctx.executor.as_ref(), &action, self.ctx.retry)
                            .await;
                    self.ctx.events.publish(OrchestratorEvent::ActionExecuted {
                        action_id: action.id.clone(),
                        kind: action.kind.clone(),
                        success: result.success,
                        detail: result.detail.clone(),
                        timestamp: Utc::now(),
                    });
                    if result.success {
                        actions_executed += 1;
                        if let Err(err) = self.ctx.approvals.close(&action.id) {
                            fatal = Some(format!("approval close failed: {}", err));
                            break;
                        }
                        // Resolve the task once nothing else is parked on it
                        let still_open = self
                            .ctx
                            .approvals
                            .pending_for(agent)
                            .iter()
                            .any(|r| r.task_id == request.task_id);
                        if !still_open && self.ctx.router.complete(&request.task_id).is_ok() {
                            tasks_resolved += 1;
                        }
                    } else {
                        run.add_blocker(Blocker::ExecutionFailed {
                            action_id: action.id.clone(),
                            action_kind: action.kind.clone(),
                            task_id: request.task_id.clone(),
                            detail: result.detail,
                        });
                    }
                }
                Authorization::Denied { reason } => {
                    run.add_blocker(Blocker::RiskDenied {
                        action_id: action.id.clone(),
                        action_kind: action.kind.clone(),
                        task_id: request.task_id.clone(),
                        reason,
                    });
                    // Terminal decision acted on; drop it from the queue
                    if let Err(err) = self.ctx.approvals.close(&action.id) {
                        fatal = Some(format!("approval close failed: {}", err));
                        break;
                    }
                }
                Authorization::PendingApproval => {
                    // Still undecided; keep surfacing it
                    run.add_blocker(Blocker::ApprovalPending {
                        action_id: action.id.clone(),
                        action_kind: action.kind.clone(),
                        task_id: request.task_id.clone(),
                    });
                }
            }
        }

        // ── Claim a batch ────────────────────────────────────────────────
        let mut claimed = Vec::new();
        if !halted && !timed_out && fatal.is_none() {
            for _ in 0..budget.max_batch {
                match self.ctx.router.next(agent, &run.run_id) {
                    Some(task) => {
                        run.mark_working();
                        run.claimed_task_ids.insert(task.id.clone());
                        self.ctx.events.publish(OrchestratorEvent::TaskClaimed {
                            agent,
                            run_id: run.run_id.clone(),
                            task_id: task.id.clone(),
                            tier: PriorityTier::of(&task),
                            timestamp: Utc::now(),
                        });
                        claimed.push(task);
                    }
                    None => break,
                }
            }
        }

        // ── Process the batch ────────────────────────────────────────────
        let mut next_idx = 0;
        'tasks: while next_idx < claimed.len() && fatal.is_none() && !halted && !timed_out {
            let task = &claimed[next_idx];
            next_idx += 1;

            let requests = match worker.plan(task).await {
                Ok(requests) => requests,
                Err(err) => {
                    fatal = Some(format!("worker plan failed: {}", err));
                    next_idx -= 1;
                    break 'tasks;
                }
            };

            let mut task_blocked = false;
            for request in requests {
                // Emergency stop and wall clock gate every execution
                if self.ctx.controls.emergency_stopped() {
                    halted = true;
                    next_idx -= 1;
                    continue 'tasks;
                }
                if Utc::now() > deadline {
                    timed_out = true;
                    next_idx -= 1;
                    continue 'tasks;
                }

                let action = self.ctx.gate.classify(agent, &task.id, request);
                let verdict = self.ctx.gate.authorize(&action, &self.ctx.approvals);
                self.publish_authorized(&action, &verdict);

                match verdict {
                    Authorization::Allowed => {
                        let result =
                            execute_with_retry(self.ctx.executor.as_ref(), &action, self.ctx.retry)
                                .await;
                        self.ctx.events.publish(OrchestratorEvent::ActionExecuted {
                            action_id: action.id.clone(),
                            kind: action.kind.clone(),
                            success: result.success,
                            detail: result.detail.clone(),
                            timestamp: Utc::now(),
                        });
                        if result.success {
                            actions_executed += 1;
                        } else {
                            run.add_blocker(Blocker::ExecutionFailed {
                                action_id: action.id.clone(),
                                action_kind: action.kind.clone(),
                                task_id: task.id.clone(),
                                detail: result.detail,
                            });
                            task_blocked = true;
                        }
                    }
                    Authorization::PendingApproval => {
                        if let Err(err) =
                            self.ctx.approvals.request(ApprovalRequest::for_action(&action))
                        {
                            fatal = Some(format!("approval request failed: {}", err));
                            next_idx -= 1;
                            break 'tasks;
                        }
                        self.ctx.events.publish(OrchestratorEvent::ApprovalRequested {
                            action_id: action.id.clone(),
                            agent,
                            kind: action.kind.clone(),
                            risk_tier: action.risk_tier,
                            timestamp: Utc::now(),
                        });
                        run.pending_action_ids.push(action.id.clone());
                        run.add_blocker(Blocker::ApprovalPending {
                            action_id: action.id.clone(),
                            action_kind: action.kind.clone(),
                            task_id: task.id.clone(),
                        });
                        task_blocked = true;
                    }
                    Authorization::Denied { reason } => {
                        run.add_blocker(Blocker::RiskDenied {
                            action_id: action.id.clone(),
                            action_kind: action.kind.clone(),
                            task_id: task.id.clone(),
                            reason,
                        });
                        task_blocked = true;
                    }
                }
            }

            let outcome = if task_blocked {
                self.ctx.router.block(&task.id)
            } else {
                tasks_resolved += 1;
                self.ctx.router.complete(&task.id)
            };
            if let Err(err) = outcome {
                fatal = Some(format!("task status update failed: {}", err));
                break 'tasks;
            }
        }

        // Unprocessed claims go back to the router; the next run
        // re-derives its work from there, not from this run's copy
        for task in &claimed[next_idx..] {
            if let Err(err) = self.ctx.router.release(&task.id) {
                tracing::warn!(task_id = %task.id, error = %err, "release failed");
            }
        }

        // ── Terminal decision ────────────────────────────────────────────
        if let Some(message) = fatal {
            tracing::error!(run = %run.summary(), %message, "fatal; nothing committed");
            run.block(BlockReason::FatalError { message });
            self.publish_terminal(&run);
            return RunResult::from_run(&run, false);
        }

        let queue_drained = !self.ctx.router.has_pending(agent);
        let satisfied = queue_drained && worker.is_satisfied(&run);

        if halted {
            run.block(BlockReason::EmergencyStop);
        } else if timed_out {
            run.block(BlockReason::WallClockExhausted {
                budget_secs: budget.max_wall_clock_secs,
            });
        } else if satisfied {
            run.complete();
        } else if !run.budget_remaining() {
            run.block(BlockReason::IterationBudgetExhausted {
                max: budget.max_iterations,
            });
        }
        // otherwise the run stays working-incomplete and asks for a
        // continuation below

        // ── Commit, all or nothing ───────────────────────────────────────
        durable.iteration = run.iteration;
        let episode_over = run.state == RunState::Complete
            || matches!(
                run.block_reason,
                Some(BlockReason::IterationBudgetExhausted { .. })
            );
        if episode_over {
            // The next externally scheduled invocation starts fresh
            durable.iteration = 0;
        }
        durable.last_run_id = Some(run.run_id.clone());
        durable.last_state = run.state;
        durable.last_block_reason = run.block_reason.clone();
        durable.claimed_task_ids = run.claimed_task_ids.clone();
        durable.blockers = run.blockers.clone();
        durable.total_runs += 1;
        durable.version += 1;
        durable.updated_at = Utc::now();
        durable.bump_metric("tasks_resolved", f64::from(tasks_resolved));
        durable.bump_metric("actions_executed", f64::from(actions_executed));

        if let Err(err) = self.ctx.store.commit(&durable) {
            // The previous committed state is still intact on disk
            run.block(BlockReason::FatalError {
                message: format!("commit failed: {}", err),
            });
            self.publish_terminal(&run);
            return RunResult::from_run(&run, false);
        }

        // ── Self-dispatch decision ───────────────────────────────────────
        let incomplete = matches!(run.state, RunState::Working | RunState::Idle);
        let mut dispatched = false;
        if incomplete {
            if self.ctx.controls.emergency_stopped() {
                tracing::info!(run = %run.summary(), "continuation suppressed by emergency stop");
            } else {
                let reason = format!("queue not drained after cycle {}", run.iteration);
                tracing::info!(run = %run.summary(), %reason, "self-dispatch requested");
                self.ctx
                    .events
                    .publish(OrchestratorEvent::SelfDispatchRequested {
                        agent,
                        run_id: run.run_id.clone(),
                        iteration: run.iteration,
                        reason: reason.clone(),
                        timestamp: Utc::now(),
                    });
                self.ctx.dispatcher.request_run(agent, &reason);
                dispatched = true;
            }
        }

        self.publish_terminal(&run);
        RunResult::from_run(&run, dispatched)
    }
}
