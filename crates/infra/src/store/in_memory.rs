use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use tradeledger_core::{CompanyId, DocumentId, Entity, PaymentId, StockUnitId, TransferId};
use tradeledger_inventory::{StockUnit, Transfer, TransferStatus};
use tradeledger_settlement::{DocumentRef, Payment, SettlementTarget};

use super::r#trait::{LedgerStore, LedgerTransaction, StoreError};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    stock_units: HashMap<StockUnitId, StockUnit>,
    transfers: HashMap<TransferId, Transfer>,
    usages: HashSet<(CompanyId, StockUnitId, DocumentId)>,
    targets: HashMap<(CompanyId, DocumentRef), SettlementTarget>,
    payments: HashMap<(CompanyId, PaymentId), Payment>,
    applied: HashMap<(CompanyId, DocumentRef), Decimal>,
}

impl LedgerState {
    fn stock_unit(&self, company_id: CompanyId, id: StockUnitId) -> Option<&StockUnit> {
        self.stock_units
            .get(&id)
            .filter(|u| u.is_owned_by(company_id))
    }

    fn transfer(&self, company_id: CompanyId, id: TransferId) -> Option<&Transfer> {
        self.transfers.get(&id).filter(|t| t.is_owned_by(company_id))
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. One async mutex guards the whole state, so
/// transactions are fully serialised; a transaction mutates a staged copy that
/// replaces the shared state on commit and is discarded otherwise.
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    lock_timeout: Duration,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(5))
    }

    /// Waiting longer than `lock_timeout` for the state surfaces as
    /// `StoreError::TransactionFailed`.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            lock_timeout,
        }
    }

    async fn lock(&self) -> Result<OwnedMutexGuard<LedgerState>, StoreError> {
        tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::TransactionFailed(format!(
                    "timed out after {:?} waiting for the ledger lock",
                    self.lock_timeout
                ))
            })
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemoryLedgerTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
}

#[async_trait::async_trait]
impl LedgerTransaction for InMemoryLedgerTransaction {
    async fn stock_unit_for_update(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Option<StockUnit>, StoreError> {
        Ok(self.staged.stock_unit(company_id, id).cloned())
    }

    async fn insert_stock_unit(&mut self, unit: &StockUnit) -> Result<(), StoreError> {
        let id = unit.id_typed();
        if self.staged.stock_units.contains_key(&id) {
            return Err(StoreError::Conflict(format!("stock unit {id} already exists")));
        }
        let duplicate_no = self.staged.stock_units.values().any(|u| {
            u.company_id() == unit.company_id()
                && u.financial_year() == unit.financial_year()
                && u.challan_no() == unit.challan_no()
        });
        if duplicate_no {
            return Err(StoreError::Conflict(format!(
                "challan number {} already issued",
                unit.challan_no()
            )));
        }
        self.staged.stock_units.insert(id, unit.clone());
        Ok(())
    }

    async fn update_stock_unit(&mut self, unit: &StockUnit) -> Result<(), StoreError> {
        match self.staged.stock_units.get_mut(&unit.id_typed()) {
            Some(existing) if existing.company_id() == unit.company_id() => {
                *existing = unit.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("stock unit {}", unit.id_typed()))),
        }
    }

    async fn transfer_for_update(
        &mut self,
        company_id: CompanyId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        Ok(self.staged.transfer(company_id, id).cloned())
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        let id = transfer.id_typed();
        if self.staged.transfers.contains_key(&id) {
            return Err(StoreError::Conflict(format!("transfer {id} already exists")));
        }
        self.staged.transfers.insert(id, transfer.clone());
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        match self.staged.transfers.get_mut(&transfer.id_typed()) {
            Some(existing) if existing.company_id() == transfer.company_id() => {
                *existing = transfer.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("transfer {}", transfer.id_typed()))),
        }
    }

    async fn has_completed_transfers_from(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<bool, StoreError> {
        Ok(self.staged.transfers.values().any(|t| {
            t.is_owned_by(company_id)
                && t.source_stock_unit_id() == id
                && t.status() == TransferStatus::Completed
        }))
    }

    async fn has_invoice_usage(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .staged
            .usages
            .iter()
            .any(|(company, unit, _)| *company == company_id && *unit == id))
    }

    async fn insert_invoice_usage(
        &mut self,
        company_id: CompanyId,
        stock_unit_id: StockUnitId,
        invoice_id: DocumentId,
    ) -> Result<(), StoreError> {
        // Recording the same usage twice is a no-op.
        self.staged
            .usages
            .insert((company_id, stock_unit_id, invoice_id));
        Ok(())
    }

    async fn settlement_target_for_update(
        &mut self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Option<SettlementTarget>, StoreError> {
        Ok(self.staged.targets.get(&(company_id, document)).cloned())
    }

    async fn upsert_settlement_target(
        &mut self,
        target: &SettlementTarget,
    ) -> Result<(), StoreError> {
        self.staged
            .targets
            .insert((target.company_id(), target.document()), target.clone());
        Ok(())
    }

    async fn applied_total(
        &mut self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Decimal, StoreError> {
        Ok(self
            .staged
            .applied
            .get(&(company_id, document))
            .copied()
            .unwrap_or_default())
    }

    async fn payment_exists(
        &mut self,
        company_id: CompanyId,
        id: PaymentId,
    ) -> Result<bool, StoreError> {
        Ok(self.staged.payments.contains_key(&(company_id, id)))
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let key = (payment.company_id(), payment.id_typed());
        if self.staged.payments.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "payment {} already exists",
                payment.id_typed()
            )));
        }
        for allocation in payment.allocations() {
            *self
                .staged
                .applied
                .entry((payment.company_id(), allocation.target))
                .or_default() += allocation.amount_applied;
        }
        self.staged.payments.insert(key, payment.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryLedgerTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Dropping the staged copy discards every write.
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let guard = self.lock().await?;
        let staged = guard.clone();
        Ok(Box::new(InMemoryLedgerTransaction { guard, staged }))
    }

    async fn stock_unit(
        &self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Option<StockUnit>, StoreError> {
        let state = self.lock().await?;
        Ok(state.stock_unit(company_id, id).cloned())
    }

    async fn transfer(
        &self,
        company_id: CompanyId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        let state = self.lock().await?;
        Ok(state.transfer(company_id, id).cloned())
    }

    async fn transfers_from(
        &self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Vec<Transfer>, StoreError> {
        let state = self.lock().await?;
        let mut transfers: Vec<Transfer> = state
            .transfers
            .values()
            .filter(|t| t.is_owned_by(company_id) && t.source_stock_unit_id() == id)
            .cloned()
            .collect();
        transfers.sort_by_key(|t| (t.created_at(), t.id_typed()));
        Ok(transfers)
    }

    async fn transfers(&self, company_id: CompanyId) -> Result<Vec<Transfer>, StoreError> {
        let state = self.lock().await?;
        let mut transfers: Vec<Transfer> = state
            .transfers
            .values()
            .filter(|t| t.is_owned_by(company_id))
            .cloned()
            .collect();
        transfers.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(transfers)
    }

    async fn available_stock_units(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<StockUnit>, StoreError> {
        let state = self.lock().await?;
        let mut units: Vec<StockUnit> = state
            .stock_units
            .values()
            .filter(|u| u.is_owned_by(company_id) && u.is_active() && u.has_available())
            .cloned()
            .collect();
        units.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(units)
    }

    async fn applied_totals(
        &self,
        company_id: CompanyId,
        documents: &[DocumentRef],
    ) -> Result<HashMap<DocumentRef, Decimal>, StoreError> {
        let state = self.lock().await?;
        Ok(documents
            .iter()
            .filter_map(|doc| {
                state
                    .applied
                    .get(&(company_id, *doc))
                    .map(|amount| (*doc, *amount))
            })
            .collect())
    }

    async fn settlement_target(
        &self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Option<SettlementTarget>, StoreError> {
        let state = self.lock().await?;
        Ok(state.targets.get(&(company_id, document)).cloned())
    }

    async fn payment(
        &self,
        company_id: CompanyId,
        id: PaymentId,
    ) -> Result<Option<Payment>, StoreError> {
        let state = self.lock().await?;
        Ok(state.payments.get(&(company_id, id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tradeledger_core::{FinancialYear, PartyId, Quantity};
    use tradeledger_inventory::NewPurchase;

    fn unit(company_id: CompanyId, challan_no: &str) -> StockUnit {
        StockUnit::purchased(NewPurchase {
            id: StockUnitId::new(),
            company_id,
            financial_year: FinancialYear::parse("2025").unwrap(),
            challan_no: challan_no.to_string(),
            party_id: PartyId::new(),
            quantity: Quantity::new(10, dec!(5)),
            received_at: Utc::now(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = InMemoryLedgerStore::new();
        let company = CompanyId::new();
        let u = unit(company, "CH-2025-0001");
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_stock_unit(&u).await.unwrap();
        }
        assert!(store.stock_unit(company, u.id_typed()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = InMemoryLedgerStore::new();
        let company = CompanyId::new();
        let u = unit(company, "CH-2025-0001");
        let mut tx = store.begin().await.unwrap();
        tx.insert_stock_unit(&u).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.stock_unit(company, u.id_typed()).await.unwrap().is_some());
        // Other companies cannot see it.
        assert!(
            store
                .stock_unit(CompanyId::new(), u.id_typed())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_challan_number_conflicts() {
        let store = InMemoryLedgerStore::new();
        let company = CompanyId::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_stock_unit(&unit(company, "CH-2025-0001")).await.unwrap();
        let err = tx
            .insert_stock_unit(&unit(company, "CH-2025-0001"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn waiting_past_lock_timeout_fails_the_transaction() {
        let store = InMemoryLedgerStore::with_lock_timeout(Duration::from_millis(20));
        let _held = store.begin().await.unwrap();
        let err = store.begin().await.err().unwrap();
        assert!(matches!(err, StoreError::TransactionFailed(_)));
    }
}
