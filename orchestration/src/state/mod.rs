//! Durable, idempotent persistence of per-agent run state

pub mod store;
pub mod types;

pub use store::{atomic_write_json, StateStore, StoreError, StoreResult};
pub use types::AgentState;
