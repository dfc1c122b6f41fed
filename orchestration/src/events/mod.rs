//! Orchestrator event stream

pub mod bus;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::OrchestratorEvent;
