//! File-backed state store with atomic whole-state commits
//!
//! One JSON document per agent under a state directory. `commit` is
//! all-or-nothing: the new state is written to a temp file in the same
//! directory, fsynced, then renamed over the old document. A crash at
//! any point leaves the previous committed state readable. There is no
//! update-in-place surface, only whole-state replacement.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::types::AgentState;
use crate::agent::AgentKind;

/// Error type for state store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt state document at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Per-agent state partitions on disk
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Open or create a state store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The state directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, agent: AgentKind) -> PathBuf {
        self.dir.join(format!("{}.json", agent))
    }

    /// Load the last committed state for `agent`, or a fresh default when
    /// none has ever been committed.
    pub fn load(&self, agent: AgentKind) -> StoreResult<AgentState> {
        let path = self.path_for(agent);
        if !path.exists() {
            return Ok(AgentState::new(agent));
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path,
            message: e.to_string(),
        })
    }

    /// Atomically replace the committed state for the state's agent.
    /// Either the full new document becomes visible or the old one
    /// remains; a partially written temp file is never read back.
    pub fn commit(&self, state: &AgentState) -> StoreResult<()> {
        let path = self.path_for(state.agent);
        atomic_write_json(&path, state)?;
        tracing::debug!(agent = %state.agent, version = state.version, "state committed");
        Ok(())
    }

    /// Machine-readable snapshot of every committed agent partition,
    /// for observability tooling.
    pub fn snapshot(&self) -> StoreResult<Vec<AgentState>> {
        let mut states = Vec::new();
        for agent in AgentKind::all() {
            if self.path_for(*agent).exists() {
                states.push(self.load(*agent)?);
            }
        }
        Ok(states)
    }
}

/// Write `value` as pretty JSON to `path` via temp-file-then-rename in
/// the same directory. Shared by the store and the approval queue.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state.json");
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
