use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use tradeledger_core::{CompanyId, DocumentId, PaymentId, StockUnitId, TransferId};
use tradeledger_inventory::{StockUnit, Transfer};
use tradeledger_settlement::{DocumentRef, Payment, SettlementTarget};

/// Storage operation error.
///
/// These are infrastructure failures, as opposed to domain errors
/// (validation, invariants, business rules).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write (typically a concurrent duplicate).
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// Serialization failure, deadlock, lock timeout or statement timeout.
    /// Safe to retry the whole operation.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("stored data could not be decoded: {0}")]
    Serialization(String),
}

/// One open store transaction.
///
/// Every `*_for_update` read takes the row lock for the rest of the transaction,
/// so check-then-write sequences cannot interleave with another transaction
/// touching the same row. Dropping the transaction without `commit` rolls it back.
#[async_trait::async_trait]
pub trait LedgerTransaction: Send {
    async fn stock_unit_for_update(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Option<StockUnit>, StoreError>;

    async fn insert_stock_unit(&mut self, unit: &StockUnit) -> Result<(), StoreError>;

    async fn update_stock_unit(&mut self, unit: &StockUnit) -> Result<(), StoreError>;

    async fn transfer_for_update(
        &mut self,
        company_id: CompanyId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError>;

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError>;

    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError>;

    /// Whether a `Completed` transfer is sourced from this unit.
    async fn has_completed_transfers_from(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<bool, StoreError>;

    /// Whether any invoice has consumed this unit.
    async fn has_invoice_usage(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<bool, StoreError>;

    async fn insert_invoice_usage(
        &mut self,
        company_id: CompanyId,
        stock_unit_id: StockUnitId,
        invoice_id: DocumentId,
    ) -> Result<(), StoreError>;

    async fn settlement_target_for_update(
        &mut self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Option<SettlementTarget>, StoreError>;

    async fn upsert_settlement_target(&mut self, target: &SettlementTarget)
    -> Result<(), StoreError>;

    /// Sum of `amount_applied` over all allocations to `document`.
    async fn applied_total(
        &mut self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Decimal, StoreError>;

    async fn payment_exists(
        &mut self,
        company_id: CompanyId,
        id: PaymentId,
    ) -> Result<bool, StoreError>;

    /// Insert the payment together with all of its allocations.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Ledger persistence boundary.
///
/// Mutations happen only through [`LedgerTransaction`]; the remaining methods
/// are plain committed reads. Implementations must be correct when several
/// processes share one backing store.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError>;

    async fn stock_unit(
        &self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Option<StockUnit>, StoreError>;

    async fn transfer(
        &self,
        company_id: CompanyId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError>;

    /// Transfers sourced from a unit, any status, oldest first.
    async fn transfers_from(
        &self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Vec<Transfer>, StoreError>;

    /// Every transfer of the company, any status, newest first.
    async fn transfers(&self, company_id: CompanyId) -> Result<Vec<Transfer>, StoreError>;

    /// Active units with something left in either dimension, newest first.
    async fn available_stock_units(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<StockUnit>, StoreError>;

    /// Applied totals for many documents in one read. Documents with nothing
    /// applied are absent from the map.
    async fn applied_totals(
        &self,
        company_id: CompanyId,
        documents: &[DocumentRef],
    ) -> Result<HashMap<DocumentRef, Decimal>, StoreError>;

    async fn settlement_target(
        &self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Option<SettlementTarget>, StoreError>;

    async fn payment(
        &self,
        company_id: CompanyId,
        id: PaymentId,
    ) -> Result<Option<Payment>, StoreError>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn stock_unit(
        &self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Option<StockUnit>, StoreError> {
        (**self).stock_unit(company_id, id).await
    }

    async fn transfer(
        &self,
        company_id: CompanyId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        (**self).transfer(company_id, id).await
    }

    async fn transfers_from(
        &self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Vec<Transfer>, StoreError> {
        (**self).transfers_from(company_id, id).await
    }

    async fn transfers(&self, company_id: CompanyId) -> Result<Vec<Transfer>, StoreError> {
        (**self).transfers(company_id).await
    }

    async fn available_stock_units(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<StockUnit>, StoreError> {
        (**self).available_stock_units(company_id).await
    }

    async fn applied_totals(
        &self,
        company_id: CompanyId,
        documents: &[DocumentRef],
    ) -> Result<HashMap<DocumentRef, Decimal>, StoreError> {
        (**self).applied_totals(company_id, documents).await
    }

    async fn settlement_target(
        &self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Option<SettlementTarget>, StoreError> {
        (**self).settlement_target(company_id, document).await
    }

    async fn payment(
        &self,
        company_id: CompanyId,
        id: PaymentId,
    ) -> Result<Option<Payment>, StoreError> {
        (**self).payment(company_id, id).await
    }
}
