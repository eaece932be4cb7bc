//! In-memory audit sink for tests/dev.

use std::sync::Mutex;

use tradeledger_core::CompanyId;

use crate::audit::AuditRecord;
use crate::sink::{AuditError, AuditSink};

/// Collects audit records in memory, in delivery order.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records delivered so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(_) => vec![],
        }
    }

    /// Records for one company, in delivery order.
    pub fn for_company(&self, company_id: CompanyId) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.company_id() == company_id)
            .collect()
    }

    /// Actions delivered so far (convenience for assertions).
    pub fn actions(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| r.action().to_string())
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AuditError::Unavailable("lock poisoned".to_string()))?;
        records.push(record);
        Ok(())
    }
}
