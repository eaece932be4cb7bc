//! Quantity changes on stock units, inside a caller-owned transaction.

use chrono::{DateTime, Utc};
use tracing::debug;

use tradeledger_core::{CompanyId, Quantity, StockUnitId};
use tradeledger_inventory::StockUnit;

use crate::error::EngineError;
use crate::store::LedgerTransaction;

/// Reserve and restore against a locked stock unit.
///
/// Both operations lock the row, apply the change to the loaded unit, and
/// write it back through the same transaction. The check and the write are
/// therefore never separated by a commit.
#[derive(Debug, Default, Clone, Copy)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Take `quantity` out of `available` into `transferred`.
    ///
    /// Fails with `InsufficientInventory` when either dimension falls short.
    pub async fn reserve(
        &self,
        tx: &mut dyn LedgerTransaction,
        company_id: CompanyId,
        stock_unit_id: StockUnitId,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> Result<StockUnit, EngineError> {
        let mut unit = lock(tx, company_id, stock_unit_id).await?;
        unit.reserve(quantity, at)?;
        tx.update_stock_unit(&unit).await?;
        debug!(%stock_unit_id, boxes = quantity.boxes, meters = %quantity.meters, "reserved");
        Ok(unit)
    }

    /// Credit `quantity` back to a unit; only reversal calls this.
    ///
    /// Overshooting the unit's total is an `InvariantViolation`.
    pub async fn restore(
        &self,
        tx: &mut dyn LedgerTransaction,
        company_id: CompanyId,
        stock_unit_id: StockUnitId,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> Result<StockUnit, EngineError> {
        let mut unit = lock(tx, company_id, stock_unit_id).await?;
        unit.restore(quantity, at)?;
        tx.update_stock_unit(&unit).await?;
        debug!(%stock_unit_id, boxes = quantity.boxes, meters = %quantity.meters, "restored");
        Ok(unit)
    }
}

async fn lock(
    tx: &mut dyn LedgerTransaction,
    company_id: CompanyId,
    stock_unit_id: StockUnitId,
) -> Result<StockUnit, EngineError> {
    tx.stock_unit_for_update(company_id, stock_unit_id)
        .await?
        .ok_or_else(|| EngineError::not_found(format!("stock unit {stock_unit_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tradeledger_core::{FinancialYear, PartyId, QuantityUnit};
    use tradeledger_inventory::NewPurchase;

    use crate::store::{InMemoryLedgerStore, LedgerStore};

    async fn seeded(company_id: CompanyId, quantity: Quantity) -> (InMemoryLedgerStore, StockUnitId) {
        let store = InMemoryLedgerStore::new();
        let unit = StockUnit::purchased(NewPurchase {
            id: StockUnitId::new(),
            company_id,
            financial_year: FinancialYear::parse("2025").unwrap(),
            challan_no: "CH-2025-0001".into(),
            party_id: PartyId::new(),
            quantity,
            received_at: Utc::now(),
        })
        .unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_stock_unit(&unit).await.unwrap();
        tx.commit().await.unwrap();
        (store, unit.id_typed())
    }

    #[tokio::test]
    async fn reserve_then_restore_returns_to_full() {
        let company = CompanyId::new();
        let (store, id) = seeded(company, Quantity::new(100, dec!(50))).await;
        let ledger = InventoryLedger::new();

        let mut tx = store.begin().await.unwrap();
        let reserved = ledger
            .reserve(tx.as_mut(), company, id, Quantity::new(40, dec!(10)), Utc::now())
            .await
            .unwrap();
        assert_eq!(reserved.available(), Quantity::new(60, dec!(40)));
        let restored = ledger
            .restore(tx.as_mut(), company, id, Quantity::new(40, dec!(10)), Utc::now())
            .await
            .unwrap();
        assert_eq!(restored.available(), restored.total());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn reserve_beyond_available_is_rejected() {
        let company = CompanyId::new();
        let (store, id) = seeded(company, Quantity::new(10, dec!(5))).await;

        let mut tx = store.begin().await.unwrap();
        let err = InventoryLedger::new()
            .reserve(tx.as_mut(), company, id, Quantity::new(11, dec!(0)), Utc::now())
            .await
            .unwrap_err();
        match err {
            EngineError::InsufficientInventory { unit, available, requested } => {
                assert_eq!(unit, QuantityUnit::Boxes);
                assert_eq!(available, dec!(10));
                assert_eq!(requested, dec!(11));
            }
            other => panic!("expected InsufficientInventory, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn restore_past_total_is_an_invariant_violation() {
        let company = CompanyId::new();
        let (store, id) = seeded(company, Quantity::new(10, dec!(0))).await;

        let mut tx = store.begin().await.unwrap();
        let err = InventoryLedger::new()
            .restore(tx.as_mut(), company, id, Quantity::new(1, dec!(0)), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn unknown_unit_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = InventoryLedger::new()
            .reserve(
                tx.as_mut(),
                CompanyId::new(),
                StockUnitId::new(),
                Quantity::new(1, dec!(0)),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
