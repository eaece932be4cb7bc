use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::store::StoreError;

use super::{SequenceGenerator, SequenceScope};

/// In-memory sequence generator.
///
/// Intended for tests/dev. Each scope is an `AtomicU64`; the map lock is only
/// taken to find or create a scope's counter, never around the increment.
#[derive(Debug, Default)]
pub struct InMemorySequenceGenerator {
    counters: RwLock<HashMap<SequenceScope, Arc<AtomicU64>>>,
}

impl InMemorySequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value issued for `scope` (0 when unused).
    pub fn current(&self, scope: &SequenceScope) -> u64 {
        self.counters
            .read()
            .ok()
            .and_then(|counters| counters.get(scope).map(|c| c.load(Ordering::SeqCst)))
            .unwrap_or(0)
    }

    fn counter(&self, scope: &SequenceScope) -> Result<Arc<AtomicU64>, StoreError> {
        {
            let counters = self
                .counters
                .read()
                .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
            if let Some(counter) = counters.get(scope) {
                return Ok(counter.clone());
            }
        }
        let mut counters = self
            .counters
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(counters.entry(scope.clone()).or_default().clone())
    }
}

#[async_trait::async_trait]
impl SequenceGenerator for InMemorySequenceGenerator {
    async fn next(&self, scope: &SequenceScope) -> Result<u64, StoreError> {
        let counter = self.counter(scope)?;
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::DocumentType;
    use tradeledger_core::{CompanyId, FinancialYear};

    fn scope(document_type: DocumentType) -> SequenceScope {
        SequenceScope::new(
            CompanyId::from_uuid(uuid::Uuid::nil()),
            FinancialYear::parse("2025").unwrap(),
            document_type,
        )
    }

    #[tokio::test]
    async fn scopes_count_independently() {
        let generator = InMemorySequenceGenerator::new();
        assert_eq!(generator.next(&scope(DocumentType::Challan)).await.unwrap(), 1);
        assert_eq!(generator.next(&scope(DocumentType::Challan)).await.unwrap(), 2);
        assert_eq!(generator.next(&scope(DocumentType::Transfer)).await.unwrap(), 1);
        assert_eq!(generator.current(&scope(DocumentType::Challan)), 2);
        assert_eq!(generator.current(&scope(DocumentType::Receipt)), 0);
    }
}
