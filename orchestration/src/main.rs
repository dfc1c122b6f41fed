//! Operator CLI for the orchestration core
//!
//! This is the thin surface an external dispatcher (cron trigger,
//! workflow runner) or a human operator drives. The library does the
//! actual work; the binary wires durable stores together, executes
//! bounded cycles, and exposes the approval queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};

use orchestration::{
    AgentKind, ApprovalDecision, ApprovalQueue, AuditLog, ControlFlags, Decision, Impact,
    LoggingExecutor, OrchestrationResult, OrchestratorConfig, PolicyTable, QueueDispatcher,
    RiskGate, RunContext, RunMachine, StateStore, Task, TaskRouter, TaskSource, Worker,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory (overrides config paths)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one bounded cycle for an agent, following self-dispatch
    /// requests until the agent completes or blocks
    Run {
        #[arg(long)]
        agent: AgentKind,

        /// Execute a single cycle even if the run requests continuation
        #[arg(long, default_value_t = false)]
        no_follow: bool,
    },

    /// Print per-agent state snapshots and queue depths
    Status,

    /// Submit a task to an agent's queue
    SubmitTask {
        #[arg(long)]
        agent: AgentKind,

        /// Task id; generated when omitted
        #[arg(long)]
        id: Option<String>,

        /// direct_request | bug_report | backlog_ticket | external_event
        #[arg(long, default_value = "external_event")]
        source: String,

        /// high | normal
        #[arg(long, default_value = "normal")]
        impact: String,

        /// Comma-separated tags (e.g. "urgent,bug")
        #[arg(long, default_value = "")]
        tags: String,
    },

    /// List pending approval requests
    Approvals,

    /// Approve a parked action
    Approve {
        action_id: String,
        #[arg(long)]
        by: String,
    },

    /// Reject a parked action (permanent)
    Reject {
        action_id: String,
        #[arg(long)]
        by: String,
    },

    /// Engage the emergency stop (or clear it with --clear)
    EmergencyStop {
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

/// Worker used when no business logic is embedded: resolves tasks that
/// need no side effects and otherwise leaves the queue to library users
/// with real workers. Approved actions still replay through the gate.
struct DrainWorker;

#[async_trait]
impl Worker for DrainWorker {
    async fn plan(
        &mut self,
        task: &Task,
    ) -> OrchestrationResult<Vec<orchestration::ActionRequest>> {
        tracing::info!(task_id = %task.id, "no embedded worker; resolving by observation");
        Ok(Vec::new())
    }
}

fn parse_source(s: &str) -> Result<TaskSource> {
    Ok(match s {
        "direct_request" => TaskSource::DirectRequest,
        "bug_report" => TaskSource::BugReport,
        "backlog_ticket" => TaskSource::BacklogTicket,
        "external_event" => TaskSource::ExternalEvent,
        other => bail!("unknown source: {}", other),
    })
}

fn parse_impact(s: &str) -> Result<Impact> {
    Ok(match s {
        "high" => Impact::High,
        "normal" => Impact::Normal,
        other => bail!("unknown impact: {}", other),
    })
}

fn record_decision(
    config: &OrchestratorConfig,
    action_id: &str,
    by: String,
    decision: Decision,
) -> Result<()> {
    let approvals = ApprovalQueue::open(&config.approvals_path)?;
    approvals.record_decision(ApprovalDecision {
        action_id: action_id.to_string(),
        decision,
        decided_at: Utc::now(),
        decided_by: by,
    })?;
    println!("{} {}", decision, action_id);
    Ok(())
}

async fn run_agent(config: &OrchestratorConfig, agent: AgentKind, no_follow: bool) -> Result<()> {
    let router = Arc::new(TaskRouter::open(&config.tasks_path)?);
    let approvals = Arc::new(ApprovalQueue::open(&config.approvals_path)?);
    let audit = AuditLog::open(&config.audit_log_path).context("opening audit log")?;
    let gate = Arc::new(RiskGate::with_policy(PolicyTable::fleet_default(), audit));
    let store = Arc::new(StateStore::open(&config.state_dir)?);
    let dispatcher = Arc::new(QueueDispatcher::new());

    let mut ctx = RunContext::new(router, gate, approvals, store);
    ctx.executor = Arc::new(LoggingExecutor);
    ctx.dispatcher = dispatcher.clone();
    ctx.controls = ControlFlags::from_env().with_stop_file(&config.stop_file);
    ctx.retry = config.retry;

    let machine = RunMachine::new(ctx).with_budget(agent, config.budget_for(agent));
    let mut worker = DrainWorker;

    loop {
        let result = machine.run(agent, &mut worker).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        if no_follow || dispatcher.drain().is_empty() {
            break;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = OrchestratorConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.data_dir {
        config = OrchestratorConfig::default_at(dir);
    }

    match args.command {
        Command::Run { agent, no_follow } => {
            run_agent(&config, agent, no_follow).await?;
        }

        Command::Status => {
            let store = StateStore::open(&config.state_dir)?;
            let router = TaskRouter::open(&config.tasks_path)?;

            for state in store.snapshot()? {
                println!("{}", serde_json::to_string_pretty(&state)?);
            }
            for agent in AgentKind::all() {
                let pending = router.pending_count(*agent);
                if pending > 0 {
                    println!("{}: {} pending task(s)", agent, pending);
                }
            }
        }

        Command::SubmitTask {
            agent,
            id,
            source,
            impact,
            tags,
        } => {
            let router = TaskRouter::open(&config.tasks_path)?;
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let task = Task::new(&id, agent, parse_source(&source)?, parse_impact(&impact)?)
                .with_tags(tags.split(',').filter(|t| !t.is_empty()));
            router.submit(task)?;
            println!("submitted {}", id);
        }

        Command::Approvals => {
            let approvals = ApprovalQueue::open(&config.approvals_path)?;
            let pending = approvals.pending();
            if pending.is_empty() {
                println!("no pending approvals");
            }
            for request in pending {
                println!(
                    "{}  {}  {}  task={}  requested={}",
                    request.action_id,
                    request.kind,
                    request.risk_tier,
                    request.task_id,
                    request.requested_at.to_rfc3339(),
                );
            }
        }

        Command::Approve { action_id, by } => {
            record_decision(&config, &action_id, by, Decision::Approve)?;
        }

        Command::Reject { action_id, by } => {
            record_decision(&config, &action_id, by, Decision::Reject)?;
        }

        Command::EmergencyStop { clear } => {
            if clear {
                if config.stop_file.exists() {
                    std::fs::remove_file(&config.stop_file)?;
                }
                println!("emergency stop cleared");
            } else {
                if let Some(parent) = config.stop_file.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&config.stop_file, b"stopped\n")?;
                println!("emergency stop engaged");
            }
        }
    }

    Ok(())
}
