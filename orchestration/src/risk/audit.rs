//! Append-only audit log for risk decisions
//!
//! Every classification and authorization result is appended with the
//! full action payload. The core never truncates or rewrites this log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::ActionId;
use crate::agent::AgentKind;
use crate::risk::RiskTier;

/// What happened at the gate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Classified { tier: RiskTier },
    Authorized { outcome: String },
}

/// One line of the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub agent: AgentKind,
    pub action_id: ActionId,
    pub kind: String,
    #[serde(flatten)]
    pub event: AuditEvent,
    /// Full action payload, verbatim
    pub payload: serde_json::Value,
}

enum Sink {
    File(Mutex<File>),
    Memory(Mutex<Vec<AuditEntry>>),
}

/// Append-only sink for [`AuditEntry`] records, JSONL on disk.
pub struct AuditLog {
    sink: Sink,
}

impl AuditLog {
    /// Open (or create) a JSONL audit log at `path`
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            sink: Sink::File(Mutex::new(file)),
        })
    }

    /// In-memory log for tests and embedded use
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Mutex::new(Vec::new())),
        }
    }

    /// Append one entry. A write failure is reported but must never
    /// change a gate verdict, so callers log and continue.
    pub fn append(&self, entry: AuditEntry) -> std::io::Result<()> {
        match &self.sink {
            Sink::File(file) => {
                let mut line = serde_json::to_vec(&entry)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                line.push(b'\n');
                let mut file = file
                    .lock()
                    .map_err(|_| std::io::Error::other("audit log lock poisoned"))?;
                file.write_all(&line)?;
                file.flush()
            }
            Sink::Memory(entries) => {
                entries
                    .lock()
                    .map_err(|_| std::io::Error::other("audit log lock poisoned"))?
                    .push(entry);
                Ok(())
            }
        }
    }

    /// Entries recorded so far (in-memory sink only; file sinks return
    /// an empty list, use [`read_jsonl`] for those).
    pub fn entries(&self) -> Vec<AuditEntry> {
        match &self.sink {
            Sink::Memory(entries) => entries.lock().map(|e| e.clone()).unwrap_or_default(),
            Sink::File(_) => Vec::new(),
        }
    }
}

/// Read back a JSONL audit log, skipping lines that fail to parse.
pub fn read_jsonl(path: impl AsRef<Path>) -> std::io::Result<Vec<AuditEntry>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}
