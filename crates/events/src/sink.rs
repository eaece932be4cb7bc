//! Audit delivery abstraction.
//!
//! The sink is the boundary to the external audit store. The engine calls it only
//! after a transaction has committed and never retries: a failed delivery is
//! logged locally and otherwise ignored, so audit outages cannot roll back or
//! block ledger mutations.

use std::sync::Arc;

use thiserror::Error;

use crate::audit::AuditRecord;

/// Audit delivery failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("audit record rejected: {0}")]
    Rejected(String),
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Deliver one record.
    fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        (**self).record(record)
    }
}

/// Deliver a record, logging (not propagating) any failure.
pub fn emit_best_effort<S>(sink: &S, record: AuditRecord)
where
    S: AuditSink + ?Sized,
{
    let action = record.action().to_string();
    let entity_id = record.entity_id();
    if let Err(err) = sink.record(record) {
        tracing::warn!(
            action = %action,
            entity_id = %entity_id,
            error = %err,
            "audit delivery failed; continuing"
        );
    }
}

/// Sink that writes each record to the tracing pipeline.
///
/// Used when no dedicated audit store is configured; with JSON logging enabled
/// the records land in the structured log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let before = record
            .before()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let after = record.after().map(|v| v.to_string()).unwrap_or_default();

        tracing::info!(
            target: "audit",
            record_id = %record.record_id(),
            company_id = %record.company_id(),
            actor_id = %record.actor_id(),
            action = record.action(),
            entity_type = record.entity_type(),
            entity_id = %record.entity_id(),
            occurred_at = %record.occurred_at(),
            before = %before,
            after = %after,
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use chrono::{DateTime, Utc};
    use tradeledger_core::{CompanyId, UserId};

    #[derive(Debug, Clone)]
    struct Probe;

    impl Event for Probe {
        fn event_type(&self) -> &'static str {
            "test.probe"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    struct DownSink;

    impl AuditSink for DownSink {
        fn record(&self, _record: AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Unavailable("connection refused".into()))
        }
    }

    fn probe_record() -> AuditRecord {
        AuditRecord::from_event(CompanyId::new(), UserId::new(), "probe", uuid::Uuid::now_v7(), &Probe)
    }

    #[test]
    fn best_effort_swallows_sink_failures() {
        // Must not panic or propagate.
        emit_best_effort(&DownSink, probe_record());
    }

    #[test]
    fn tracing_sink_always_accepts() {
        assert!(TracingAuditSink.record(probe_record()).is_ok());
    }
}
