//! JSONL audit logging: append-only writer plus a channel-fed logger thread.

pub mod audit;
pub mod jsonl;

pub use audit::{AuditEvent, AuditLoggerConfig, AuditLoggerHandle, spawn_logger};
pub use jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
