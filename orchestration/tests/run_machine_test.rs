//! End-to-end run machine behavior: bounded cycles, approval round
//! trips, emergency stop, and no-partial-commit on fatal errors

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use orchestration::{
    Action, ActionExecutor, ActionRequest, AgentKind, ApprovalDecision, ApprovalQueue,
    BlockReason, Blocker, ControlFlags, Decision, ExecutionResult, Impact, OrchestrationError,
    OrchestrationResult, QueueDispatcher, RiskGate, RunBudget, RunContext, RunMachine, RunState,
    StateStore, Task, TaskRouter, TaskSource, TaskStatus, Worker,
};

struct ScriptedWorker {
    plans: HashMap<String, Vec<ActionRequest>>,
}

impl ScriptedWorker {
    fn new() -> Self {
        Self {
            plans: HashMap::new(),
        }
    }

    fn with_plan(mut self, task_id: &str, requests: Vec<ActionRequest>) -> Self {
        self.plans.insert(task_id.to_string(), requests);
        self
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn plan(&mut self, task: &Task) -> OrchestrationResult<Vec<ActionRequest>> {
        Ok(self.plans.get(&task.id).cloned().unwrap_or_default())
    }
}

struct FailingWorker;

#[async_trait]
impl Worker for FailingWorker {
    async fn plan(&mut self, _task: &Task) -> OrchestrationResult<Vec<ActionRequest>> {
        Err(OrchestrationError::fatal("planner crashed"))
    }
}

#[derive(Default)]
struct RecordingExecutor {
    kinds: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    fn executed(&self) -> Vec<String> {
        self.kinds.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, action: &Action) -> ExecutionResult {
        self.kinds.lock().unwrap().push(action.kind.clone());
        ExecutionResult::ok("recorded")
    }
}

struct Harness {
    router: Arc<TaskRouter>,
    approvals: Arc<ApprovalQueue>,
    store: Arc<StateStore>,
    executor: Arc<RecordingExecutor>,
    dispatcher: Arc<QueueDispatcher>,
    controls: ControlFlags,
    machine: RunMachine,
    _dir: tempfile::TempDir,
}

fn harness(agent: AgentKind, budget: RunBudget) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let router = Arc::new(TaskRouter::in_memory());
    let approvals = Arc::new(ApprovalQueue::in_memory());
    let store = Arc::new(StateStore::open(dir.path()).unwrap());
    let executor = Arc::new(RecordingExecutor::default());
    let dispatcher = Arc::new(QueueDispatcher::new());
    let controls = ControlFlags::new();

    let mut ctx = RunContext::new(
        router.clone(),
        Arc::new(RiskGate::new()),
        approvals.clone(),
        store.clone(),
    );
    ctx.executor = executor.clone();
    ctx.dispatcher = dispatcher.clone();
    ctx.controls = controls.clone();

    let machine = RunMachine::new(ctx).with_budget(agent, budget);
    Harness {
        router,
        approvals,
        store,
        executor,
        dispatcher,
        controls,
        machine,
        _dir: dir,
    }
}

fn budget(max_iterations: u32, max_batch: usize) -> RunBudget {
    RunBudget {
        max_iterations,
        max_wall_clock_secs: 600,
        max_batch,
    }
}

fn task(id: &str, agent: AgentKind) -> Task {
    Task::new(id, agent, TaskSource::ExternalEvent, Impact::Normal)
}

#[tokio::test]
async fn low_risk_work_completes_in_one_cycle() {
    let h = harness(AgentKind::Support, budget(8, 5));
    h.router.submit(task("t-1", AgentKind::Support)).unwrap();
    h.router.submit(task("t-2", AgentKind::Support)).unwrap();

    let mut worker = ScriptedWorker::new()
        .with_plan("t-1", vec![ActionRequest::new("send_email", json!({"to": "x"}))]);

    let result = h.machine.run(AgentKind::Support, &mut worker).await;

    assert_eq!(result.state, RunState::Complete);
    assert_eq!(result.iterations_used, 1);
    assert!(result.blockers.is_empty());
    assert!(!result.dispatch_requested);
    assert_eq!(h.executor.executed(), vec!["send_email"]);
    assert_eq!(h.router.get("t-1").unwrap().status, TaskStatus::Done);
    assert_eq!(h.router.get("t-2").unwrap().status, TaskStatus::Done);

    // Episode over: the durable counter resets for the next trigger
    let state = h.store.load(AgentKind::Support).unwrap();
    assert_eq!(state.iteration, 0);
    assert_eq!(state.last_state, RunState::Complete);
    assert_eq!(state.version, 1);
    assert_eq!(state.metrics["tasks_resolved"], 2.0);
}

#[tokio::test]
async fn refund_waits_for_approval_then_executes_next_cycle() {
    let h = harness(AgentKind::Finance, budget(4, 3));
    h.router.submit(task("t-refund", AgentKind::Finance)).unwrap();

    let mut worker = ScriptedWorker::new().with_plan(
        "t-refund",
        vec![ActionRequest::new("refund", json!({"amount": 120}))],
    );

    // Cycle 1: the refund parks for approval; nothing executes
    let first = h.machine.run(AgentKind::Finance, &mut worker).await;
    assert_eq!(first.state, RunState::Complete);
    assert_eq!(first.blockers.len(), 1);
    assert!(matches!(first.blockers[0], Blocker::ApprovalPending { .. }));
    assert!(h.executor.executed().is_empty());
    assert_eq!(
        h.router.get("t-refund").unwrap().status,
        TaskStatus::Blocked
    );

    let pending = h.approvals.pending();
    assert_eq!(pending.len(), 1);

    // The human approves
    h.approvals
        .record_decision(ApprovalDecision {
            action_id: pending[0].action_id.clone(),
            decision: Decision::Approve,
            decided_at: chrono::Utc::now(),
            decided_by: "founder".into(),
        })
        .unwrap();

    // Cycle 2: replay executes the approved action and resolves the task
    let second = h.machine.run(AgentKind::Finance, &mut worker).await;
    assert_eq!(second.state, RunState::Complete);
    assert!(second.blockers.is_empty());
    assert_eq!(h.executor.executed(), vec!["refund"]);
    assert_eq!(h.router.get("t-refund").unwrap().status, TaskStatus::Done);
    assert!(h.approvals.pending().is_empty());
}

#[tokio::test]
async fn undecided_approval_surfaces_every_cycle() {
    let h = harness(AgentKind::Finance, budget(4, 3));
    h.router.submit(task("t-refund", AgentKind::Finance)).unwrap();

    let mut worker = ScriptedWorker::new().with_plan(
        "t-refund",
        vec![ActionRequest::new("refund", json!({"amount": 9}))],
    );

    h.machine.run(AgentKind::Finance, &mut worker).await;

    // Two more cycles with no decision: the blocker is re-surfaced, the
    // queue does not grow, nothing is dropped
    for _ in 0..2 {
        let result = h.machine.run(AgentKind::Finance, &mut worker).await;
        assert_eq!(result.blockers.len(), 1);
        assert!(matches!(result.blockers[0], Blocker::ApprovalPending { .. }));
    }
    assert_eq!(h.approvals.pending().len(), 1);
}

#[tokio::test]
async fn rejected_action_becomes_a_permanent_denial() {
    let h = harness(AgentKind::Finance, budget(4, 3));
    h.router.submit(task("t-refund", AgentKind::Finance)).unwrap();

    let mut worker = ScriptedWorker::new().with_plan(
        "t-refund",
        vec![ActionRequest::new("refund", json!({"amount": 9000}))],
    );

    h.machine.run(AgentKind::Finance, &mut worker).await;
    let action_id = h.approvals.pending()[0].action_id.clone();
    h.approvals
        .record_decision(ApprovalDecision {
            action_id,
            decision: Decision::Reject,
            decided_at: chrono::Utc::now(),
            decided_by: "founder".into(),
        })
        .unwrap();

    let result = h.machine.run(AgentKind::Finance, &mut worker).await;
    assert_eq!(result.blockers.len(), 1);
    assert!(matches!(result.blockers[0], Blocker::RiskDenied { .. }));
    assert!(h.executor.executed().is_empty());
    // Acted on: the request leaves the operator's pending queue
    assert!(h.approvals.pending().is_empty());
    assert_eq!(
        h.router.get("t-refund").unwrap().status,
        TaskStatus::Blocked
    );
}

#[tokio::test]
async fn iteration_budget_bounds_the_self_dispatch_chain() {
    let h = harness(AgentKind::Ops, budget(3, 1));
    for i in 0..5 {
        h.router
            .submit(task(&format!("t-{}", i), AgentKind::Ops))
            .unwrap();
    }
    let mut worker = ScriptedWorker::new();

    // Cycles 1 and 2: work remains and budget allows, so each run asks
    // for exactly one continuation
    for expected_iter in 1..=2 {
        let result = h.machine.run(AgentKind::Ops, &mut worker).await;
        assert_eq!(result.state, RunState::Working);
        assert_eq!(result.iterations_used, expected_iter);
        assert!(result.dispatch_requested);
        assert_eq!(h.dispatcher.drain().len(), 1);
    }

    // Cycle 3: budget reached with work remaining: hard stop, no dispatch
    let third = h.machine.run(AgentKind::Ops, &mut worker).await;
    assert_eq!(third.state, RunState::Blocked);
    assert_eq!(
        third.block_reason,
        Some(BlockReason::IterationBudgetExhausted { max: 3 })
    );
    assert!(!third.dispatch_requested);
    assert_eq!(h.dispatcher.pending(), 0);
    assert_eq!(h.router.pending_count(AgentKind::Ops), 2);

    // The next externally scheduled trigger starts a fresh episode
    let state = h.store.load(AgentKind::Ops).unwrap();
    assert_eq!(state.iteration, 0);
    let fresh = h.machine.run(AgentKind::Ops, &mut worker).await;
    assert_eq!(fresh.iterations_used, 1);
}

#[tokio::test]
async fn emergency_stop_prevents_all_work() {
    let h = harness(AgentKind::Support, budget(8, 5));
    h.router.submit(task("t-1", AgentKind::Support)).unwrap();
    h.controls.engage_emergency_stop();

    let mut worker = ScriptedWorker::new()
        .with_plan("t-1", vec![ActionRequest::new("send_email", json!({}))]);
    let result = h.machine.run(AgentKind::Support, &mut worker).await;

    assert_eq!(result.state, RunState::Blocked);
    assert_eq!(result.block_reason, Some(BlockReason::EmergencyStop));
    assert!(!result.dispatch_requested);
    assert!(h.executor.executed().is_empty());
    assert_eq!(h.router.get("t-1").unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn fatal_error_commits_nothing_and_releases_claims() {
    let h = harness(AgentKind::Code, budget(5, 2));
    h.router.submit(task("t-1", AgentKind::Code)).unwrap();

    let mut worker = FailingWorker;
    let result = h.machine.run(AgentKind::Code, &mut worker).await;

    assert_eq!(result.state, RunState::Blocked);
    assert!(matches!(
        result.block_reason,
        Some(BlockReason::FatalError { .. })
    ));

    // No partial commit: the durable state is still the pristine default
    let state = h.store.load(AgentKind::Code).unwrap();
    assert_eq!(state.version, 0);
    assert_eq!(state.total_runs, 0);

    // The claim went back to the router, so the next run re-derives it
    assert_eq!(h.router.get("t-1").unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn wall_clock_budget_blocks_the_run() {
    let h = harness(
        AgentKind::Support,
        RunBudget {
            max_iterations: 8,
            max_wall_clock_secs: 0,
            max_batch: 5,
        },
    );
    h.router.submit(task("t-1", AgentKind::Support)).unwrap();

    let mut worker = ScriptedWorker::new()
        .with_plan("t-1", vec![ActionRequest::new("send_email", json!({}))]);
    let result = h.machine.run(AgentKind::Support, &mut worker).await;

    assert_eq!(result.state, RunState::Blocked);
    assert_eq!(
        result.block_reason,
        Some(BlockReason::WallClockExhausted { budget_secs: 0 })
    );
    assert!(h.executor.executed().is_empty());
    assert_eq!(h.router.get("t-1").unwrap().status, TaskStatus::Pending);
}
