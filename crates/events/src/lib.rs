//! Domain events and the audit trail they feed.
//!
//! The engine emits one [`AuditRecord`] after every committed mutation. Storage of
//! those records is owned by an external collaborator behind [`AuditSink`];
//! delivery is best-effort and never blocks or fails the primary transaction.

pub mod audit;
pub mod event;
pub mod in_memory_sink;
pub mod sink;

pub use audit::AuditRecord;
pub use event::Event;
pub use in_memory_sink::InMemoryAuditSink;
pub use sink::{AuditError, AuditSink, TracingAuditSink, emit_best_effort};
