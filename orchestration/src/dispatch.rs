//! Self-dispatch and global controls
//!
//! Re-invocation is an external call, never in-process recursion: a run
//! that wants another cycle asks the injected [`Dispatcher`], and the
//! iteration budget lives in the state store so it survives process
//! restarts. The emergency stop is checked before every self-dispatch
//! decision and before every action execution.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentKind;

/// Scheduler seam for requesting the next bounded cycle
pub trait Dispatcher: Send + Sync {
    /// Ask for another run of `agent`. The request is a side effect the
    /// caller has already logged; implementations only have to deliver.
    fn request_run(&self, agent: AgentKind, reason: &str);
}

/// A recorded dispatch request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub agent: AgentKind,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// Dispatcher that queues requests for an external runner (cron trigger,
/// workflow engine) to drain.
#[derive(Default)]
pub struct QueueDispatcher {
    requests: Mutex<Vec<DispatchRequest>>,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all queued requests
    pub fn drain(&self) -> Vec<DispatchRequest> {
        self.requests
            .lock()
            .map(|mut reqs| std::mem::take(&mut *reqs))
            .unwrap_or_default()
    }

    /// Queued request count
    pub fn pending(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Dispatcher for QueueDispatcher {
    fn request_run(&self, agent: AgentKind, reason: &str) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(DispatchRequest {
                agent,
                reason: reason.to_string(),
                requested_at: Utc::now(),
            });
        }
    }
}

/// Dispatcher that drops requests (terminal runs, tests)
pub struct NoopDispatcher;

impl Dispatcher for NoopDispatcher {
    fn request_run(&self, _agent: AgentKind, _reason: &str) {}
}

/// Process-global control flags.
///
/// The in-memory flag covers a running process; the optional stop file
/// lets an operator halt one-shot invocations between processes.
#[derive(Clone, Default)]
pub struct ControlFlags {
    emergency_stop: Arc<AtomicBool>,
    stop_file: Option<PathBuf>,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the initial flag from `ORCH_EMERGENCY_STOP`
    /// ("1"/"true"/"yes", case-insensitive).
    pub fn from_env() -> Self {
        let engaged = std::env::var("ORCH_EMERGENCY_STOP")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let flags = Self::new();
        flags.emergency_stop.store(engaged, Ordering::SeqCst);
        flags
    }

    /// Also treat the presence of `path` as an engaged stop
    pub fn with_stop_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stop_file = Some(path.into());
        self
    }

    /// Engage the emergency stop
    pub fn engage_emergency_stop(&self) {
        tracing::warn!("emergency stop engaged");
        self.emergency_stop.store(true, Ordering::SeqCst);
    }

    /// Clear the in-memory flag
    pub fn clear_emergency_stop(&self) {
        self.emergency_stop.store(false, Ordering::SeqCst);
    }

    /// Whether new iterations and action executions must be prevented
    pub fn emergency_stopped(&self) -> bool {
        if self.emergency_stop.load(Ordering::SeqCst) {
            return true;
        }
        self.stop_file.as_ref().is_some_and(|p| p.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_dispatcher_records_and_drains() {
        let dispatcher = QueueDispatcher::new();
        dispatcher.request_run(AgentKind::Ops, "queue not drained");
        dispatcher.request_run(AgentKind::Code, "queue not drained");

        assert_eq!(dispatcher.pending(), 2);
        let drained = dispatcher.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].agent, AgentKind::Ops);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_emergency_stop_flag() {
        let flags = ControlFlags::new();
        assert!(!flags.emergency_stopped());

        flags.engage_emergency_stop();
        assert!(flags.emergency_stopped());

        flags.clear_emergency_stop();
        assert!(!flags.emergency_stopped());
    }

    #[test]
    fn test_stop_file_engages() {
        let dir = tempfile::tempdir().unwrap();
        let stop = dir.path().join("STOP");
        let flags = ControlFlags::new().with_stop_file(&stop);

        assert!(!flags.emergency_stopped());
        std::fs::write(&stop, b"halt").unwrap();
        assert!(flags.emergency_stopped());
        std::fs::remove_file(&stop).unwrap();
        assert!(!flags.emergency_stopped());
    }
}
