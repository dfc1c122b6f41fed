//! Risk gating for proposed actions
//!
//! Classification against a static per-agent policy table, idempotent
//! authorization against recorded human decisions, and an append-only
//! audit trail of every verdict.

pub mod audit;
pub mod gate;
pub mod policy;

pub use audit::{read_jsonl, AuditEntry, AuditEvent, AuditLog};
pub use gate::{Authorization, RiskGate};
pub use policy::{PolicyTable, RiskTier};
