//! Security Policy (SPEC_FULL §B): an independent gate an [`crate::agent::AgentLoop`]
//! may consult before a risky tool call, separate from the Dispatcher's own
//! rate-limiting and schema-filtering gate.

pub mod policy;

pub use policy::{AuditEntry, AutonomyLevel, RiskLevel, SecurityPolicy, ValidationResult};
