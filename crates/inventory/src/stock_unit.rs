use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{
    CompanyId, DomainError, DomainResult, Entity, FinancialYear, PartyId, Quantity, QuantityUnit,
    StockUnitId, TransferId,
};

/// Persisted lifecycle state of a stock unit.
///
/// Depletion is *not* a stored state; see [`Depletion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockUnitStatus {
    Active,
    /// Producing transfer was reversed; kept for lineage, never mutated again.
    ReversalInactive,
}

impl StockUnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockUnitStatus::Active => "active",
            StockUnitStatus::ReversalInactive => "reversal_inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(StockUnitStatus::Active),
            "reversal_inactive" => Some(StockUnitStatus::ReversalInactive),
            _ => None,
        }
    }
}

/// Derived depletion attribute of an active stock unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Depletion {
    Untouched,
    Partial,
    Full,
}

/// Fields needed to record a stock unit on purchase entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurchase {
    pub id: StockUnitId,
    pub company_id: CompanyId,
    pub financial_year: FinancialYear,
    pub challan_no: String,
    pub party_id: PartyId,
    pub quantity: Quantity,
    pub received_at: DateTime<Utc>,
}

/// Fields needed to record a stock unit received through a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransferReceipt {
    pub id: StockUnitId,
    pub company_id: CompanyId,
    pub financial_year: FinancialYear,
    pub challan_no: String,
    pub party_id: PartyId,
    pub quantity: Quantity,
    pub source_stock_unit_id: StockUnitId,
    pub source_transfer_id: TransferId,
    pub received_at: DateTime<Utc>,
}

/// StockUnit (challan): one purchased or transfer-derived batch of material.
///
/// Invariant at every committed state, per dimension:
/// `available + transferred == total`, all three non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUnit {
    id: StockUnitId,
    company_id: CompanyId,
    financial_year: FinancialYear,
    challan_no: String,
    party_id: PartyId,

    total: Quantity,
    available: Quantity,
    transferred: Quantity,

    is_transfer_source: bool,
    is_received_via_transfer: bool,
    source_stock_unit_id: Option<StockUnitId>,
    source_transfer_id: Option<TransferId>,

    status: StockUnitStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StockUnit {
    /// Stock unit recorded on purchase entry.
    pub fn purchased(new: NewPurchase) -> DomainResult<Self> {
        new.quantity.ensure_positive("purchase")?;
        Ok(Self {
            id: new.id,
            company_id: new.company_id,
            financial_year: new.financial_year,
            challan_no: new.challan_no,
            party_id: new.party_id,
            total: new.quantity,
            available: new.quantity,
            transferred: Quantity::ZERO,
            is_transfer_source: false,
            is_received_via_transfer: false,
            source_stock_unit_id: None,
            source_transfer_id: None,
            status: StockUnitStatus::Active,
            created_at: new.received_at,
            updated_at: new.received_at,
        })
    }

    /// Stock unit created for one transfer recipient.
    pub fn received_via_transfer(new: NewTransferReceipt) -> DomainResult<Self> {
        new.quantity.ensure_positive("transfer recipient")?;
        Ok(Self {
            id: new.id,
            company_id: new.company_id,
            financial_year: new.financial_year,
            challan_no: new.challan_no,
            party_id: new.party_id,
            total: new.quantity,
            available: new.quantity,
            transferred: Quantity::ZERO,
            is_transfer_source: false,
            is_received_via_transfer: true,
            source_stock_unit_id: Some(new.source_stock_unit_id),
            source_transfer_id: Some(new.source_transfer_id),
            status: StockUnitStatus::Active,
            created_at: new.received_at,
            updated_at: new.received_at,
        })
    }

    /// Rebuild a unit from persisted fields, checking the conservation invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn restore_from_storage(
        id: StockUnitId,
        company_id: CompanyId,
        financial_year: FinancialYear,
        challan_no: String,
        party_id: PartyId,
        total: Quantity,
        available: Quantity,
        transferred: Quantity,
        is_transfer_source: bool,
        is_received_via_transfer: bool,
        source_stock_unit_id: Option<StockUnitId>,
        source_transfer_id: Option<TransferId>,
        status: StockUnitStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let unit = Self {
            id,
            company_id,
            financial_year,
            challan_no,
            party_id,
            total,
            available,
            transferred,
            is_transfer_source,
            is_received_via_transfer,
            source_stock_unit_id,
            source_transfer_id,
            status,
            created_at,
            updated_at,
        };
        unit.check_conservation()?;
        Ok(unit)
    }

    pub fn id_typed(&self) -> StockUnitId {
        self.id
    }

    pub fn financial_year(&self) -> &FinancialYear {
        &self.financial_year
    }

    pub fn challan_no(&self) -> &str {
        &self.challan_no
    }

    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn total(&self) -> Quantity {
        self.total
    }

    pub fn available(&self) -> Quantity {
        self.available
    }

    pub fn transferred(&self) -> Quantity {
        self.transferred
    }

    pub fn is_transfer_source(&self) -> bool {
        self.is_transfer_source
    }

    pub fn is_received_via_transfer(&self) -> bool {
        self.is_received_via_transfer
    }

    pub fn source_stock_unit_id(&self) -> Option<StockUnitId> {
        self.source_stock_unit_id
    }

    pub fn source_transfer_id(&self) -> Option<TransferId> {
        self.source_transfer_id
    }

    pub fn status(&self) -> StockUnitStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == StockUnitStatus::Active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn depletion(&self) -> Depletion {
        if self.available.is_zero() {
            Depletion::Full
        } else if self.transferred.is_zero() {
            Depletion::Untouched
        } else {
            Depletion::Partial
        }
    }

    /// Anything left to transfer in either dimension.
    pub fn has_available(&self) -> bool {
        self.available.boxes > 0 || self.available.meters > Decimal::ZERO
    }

    /// `available + transferred == total`, all non-negative, in both dimensions.
    pub fn check_conservation(&self) -> DomainResult<()> {
        if self.total.is_negative() || self.available.is_negative() || self.transferred.is_negative()
        {
            return Err(DomainError::invariant(format!(
                "stock unit {} has a negative quantity (total {}, available {}, transferred {})",
                self.id, self.total, self.available, self.transferred
            )));
        }
        let sum = self.available.checked_add(self.transferred)?;
        if sum != self.total {
            return Err(DomainError::invariant(format!(
                "stock unit {} is not conserved: available {} + transferred {} != total {}",
                self.id, self.available, self.transferred, self.total
            )));
        }
        Ok(())
    }

    /// Check that `quantity` could be reserved right now without reserving it.
    ///
    /// Fails with `InsufficientInventory` when either dimension exceeds what is
    /// available.
    pub fn ensure_can_supply(&self, quantity: Quantity) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::validation(format!(
                "stock unit {} is inactive",
                self.id
            )));
        }
        if quantity.is_negative() {
            return Err(DomainError::validation("reserved quantity cannot be negative"));
        }
        if quantity.boxes > self.available.boxes {
            return Err(DomainError::insufficient(
                QuantityUnit::Boxes,
                Decimal::from(self.available.boxes),
                Decimal::from(quantity.boxes),
            ));
        }
        if quantity.meters > self.available.meters {
            return Err(DomainError::insufficient(
                QuantityUnit::Meters,
                self.available.meters,
                quantity.meters,
            ));
        }
        Ok(())
    }

    /// Move `quantity` from available to transferred.
    ///
    /// Fails like [`StockUnit::ensure_can_supply`]. The caller must hold the
    /// unit's row lock for the whole transaction that uses the reservation.
    pub fn reserve(&mut self, quantity: Quantity, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_can_supply(quantity)?;

        self.available = self.available.checked_sub(quantity)?;
        self.transferred = self.transferred.checked_add(quantity)?;
        self.is_transfer_source = true;
        self.updated_at = at;
        self.check_conservation()
    }

    /// Re-credit `quantity` from transferred back to available (reversal only).
    pub fn restore(&mut self, quantity: Quantity, at: DateTime<Utc>) -> DomainResult<()> {
        if quantity.is_negative() {
            return Err(DomainError::invariant("restored quantity cannot be negative"));
        }
        let available = self.available.checked_add(quantity)?;
        if available.boxes > self.total.boxes || available.meters > self.total.meters {
            return Err(DomainError::invariant(format!(
                "restoring {} to stock unit {} would exceed its total {}",
                quantity, self.id, self.total
            )));
        }
        let transferred = self.transferred.checked_sub(quantity)?;
        if transferred.is_negative() {
            return Err(DomainError::invariant(format!(
                "restoring {} to stock unit {} would make transferred quantity negative",
                quantity, self.id
            )));
        }

        self.available = available;
        self.transferred = transferred;
        self.updated_at = at;
        self.check_conservation()
    }

    /// Mark the unit inactive because its producing transfer was reversed.
    pub fn deactivate_for_reversal(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::invariant(format!(
                "stock unit {} is already inactive",
                self.id
            )));
        }
        if !self.is_received_via_transfer {
            return Err(DomainError::invariant(format!(
                "stock unit {} was not received via transfer",
                self.id
            )));
        }
        self.status = StockUnitStatus::ReversalInactive;
        self.updated_at = at;
        Ok(())
    }
}

impl Entity for StockUnit {
    type Id = StockUnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fy() -> FinancialYear {
        FinancialYear::parse("2025").unwrap()
    }

    fn purchased(boxes: i64, meters: Decimal) -> StockUnit {
        StockUnit::purchased(NewPurchase {
            id: StockUnitId::new(),
            company_id: CompanyId::new(),
            financial_year: fy(),
            challan_no: "CH-2025-0001".to_string(),
            party_id: PartyId::new(),
            quantity: Quantity::new(boxes, meters),
            received_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn purchase_starts_fully_available() {
        let unit = purchased(100, dec!(1200));
        assert_eq!(unit.available(), Quantity::new(100, dec!(1200)));
        assert_eq!(unit.transferred(), Quantity::ZERO);
        assert_eq!(unit.depletion(), Depletion::Untouched);
        assert!(!unit.is_transfer_source());
        assert!(unit.check_conservation().is_ok());
    }

    #[test]
    fn purchase_of_nothing_is_rejected() {
        let err = StockUnit::purchased(NewPurchase {
            id: StockUnitId::new(),
            company_id: CompanyId::new(),
            financial_year: fy(),
            challan_no: "CH-2025-0001".to_string(),
            party_id: PartyId::new(),
            quantity: Quantity::ZERO,
            received_at: Utc::now(),
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn reserve_moves_quantity_to_transferred() {
        let mut unit = purchased(100, dec!(1000));
        unit.reserve(Quantity::new(40, dec!(400)), Utc::now()).unwrap();
        assert_eq!(unit.available(), Quantity::new(60, dec!(600)));
        assert_eq!(unit.transferred(), Quantity::new(40, dec!(400)));
        assert_eq!(unit.depletion(), Depletion::Partial);
        assert!(unit.is_transfer_source());
    }

    #[test]
    fn reserve_beyond_available_boxes_reports_both_numbers() {
        let mut unit = purchased(100, dec!(1000));
        unit.reserve(Quantity::new(60, dec!(0)), Utc::now()).unwrap();

        let err = unit
            .reserve(Quantity::new(50, dec!(0)), Utc::now())
            .unwrap_err();
        assert_eq!(err.to_string(), "only 40 boxes available, 50 requested");
        // Failed reservation leaves the unit untouched.
        assert_eq!(unit.available().boxes, 40);
    }

    #[test]
    fn supply_check_does_not_move_anything() {
        let unit = purchased(100, dec!(0));
        let err = unit.ensure_can_supply(Quantity::new(110, dec!(0))).unwrap_err();
        assert_eq!(err.to_string(), "only 100 boxes available, 110 requested");
        assert!(unit.ensure_can_supply(Quantity::new(100, dec!(0))).is_ok());
        assert_eq!(unit.available().boxes, 100);
        assert_eq!(unit.transferred(), Quantity::ZERO);
    }

    #[test]
    fn reserve_beyond_available_meters_fails() {
        let mut unit = purchased(10, dec!(100.5));
        let err = unit
            .reserve(Quantity::new(1, dec!(100.75)), Utc::now())
            .unwrap_err();
        match err {
            DomainError::InsufficientInventory { unit, .. } => {
                assert_eq!(unit, QuantityUnit::Meters)
            }
            other => panic!("expected InsufficientInventory, got {other:?}"),
        }
    }

    #[test]
    fn restore_cannot_exceed_total() {
        let mut unit = purchased(100, dec!(1000));
        unit.reserve(Quantity::new(10, dec!(10)), Utc::now()).unwrap();
        let err = unit
            .restore(Quantity::new(11, dec!(10)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(unit.available().boxes, 90);
    }

    #[test]
    fn full_depletion_is_derived() {
        let mut unit = purchased(5, dec!(50));
        unit.reserve(Quantity::new(5, dec!(50)), Utc::now()).unwrap();
        assert_eq!(unit.depletion(), Depletion::Full);
        assert!(!unit.has_available());
        assert!(unit.is_active());
    }

    #[test]
    fn inactive_unit_cannot_be_reserved() {
        let mut unit = StockUnit::received_via_transfer(NewTransferReceipt {
            id: StockUnitId::new(),
            company_id: CompanyId::new(),
            financial_year: fy(),
            challan_no: "CH-2025-0002".to_string(),
            party_id: PartyId::new(),
            quantity: Quantity::new(4, dec!(40)),
            source_stock_unit_id: StockUnitId::new(),
            source_transfer_id: TransferId::new(),
            received_at: Utc::now(),
        })
        .unwrap();
        unit.deactivate_for_reversal(Utc::now()).unwrap();
        assert_eq!(unit.status(), StockUnitStatus::ReversalInactive);

        let err = unit.reserve(Quantity::new(1, dec!(0)), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn purchased_unit_cannot_be_deactivated_for_reversal() {
        let mut unit = purchased(1, dec!(1));
        assert!(unit.deactivate_for_reversal(Utc::now()).is_err());
    }

    #[test]
    fn storage_rebuild_rejects_unconserved_rows() {
        let err = StockUnit::restore_from_storage(
            StockUnitId::new(),
            CompanyId::new(),
            fy(),
            "CH-2025-0003".into(),
            PartyId::new(),
            Quantity::new(10, dec!(10)),
            Quantity::new(6, dec!(10)),
            Quantity::new(5, dec!(0)),
            true,
            false,
            None,
            None,
            StockUnitStatus::Active,
            Utc::now(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Reserve(i64, i64),
            Restore(i64, i64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0i64..60, 0i64..600).prop_map(|(b, m)| Op::Reserve(b, m)),
                (0i64..60, 0i64..600).prop_map(|(b, m)| Op::Restore(b, m)),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: any sequence of reserve/restore keeps the unit conserved,
            /// whether the individual operations succeed or fail.
            #[test]
            fn conservation_holds_for_any_operation_sequence(
                total_boxes in 1i64..200,
                total_centimeters in 1i64..20_000,
                ops in proptest::collection::vec(op(), 0..40)
            ) {
                let total_meters = Decimal::new(total_centimeters, 2);
                let mut unit = purchased(total_boxes, total_meters);

                for op in ops {
                    let before = unit.clone();
                    let result = match op {
                        Op::Reserve(b, m) => unit.reserve(Quantity::new(b, Decimal::from(m)), Utc::now()),
                        Op::Restore(b, m) => unit.restore(Quantity::new(b, Decimal::from(m)), Utc::now()),
                    };
                    if result.is_err() {
                        // Rejected operations must not have partially applied.
                        prop_assert_eq!(unit.available(), before.available());
                        prop_assert_eq!(unit.transferred(), before.transferred());
                    }
                    prop_assert!(unit.check_conservation().is_ok());
                    prop_assert_eq!(
                        unit.available().boxes + unit.transferred().boxes,
                        total_boxes
                    );
                    prop_assert!(unit.available().boxes >= 0);
                    prop_assert!(unit.transferred().boxes >= 0);
                }
            }
        }
    }
}
