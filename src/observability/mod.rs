//! Observability
//!
//! Structured audit trail of control-plane mutations.

pub mod audit;

pub use audit::{AuditEvent, AuditEventType, AuditLog, AuditSeverity};
