use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{
    CompanyId, DomainError, DomainResult, Entity, FinancialYear, PartyId, PaymentId, UserId,
};

use crate::target::{DocumentRef, SettlementTarget};

/// Direction of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Money received from a customer.
    Receipt,
    /// Money paid out to a supplier.
    Payment,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Receipt => "receipt",
            PaymentKind::Payment => "payment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(PaymentKind::Receipt),
            "payment" => Some(PaymentKind::Payment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub target: DocumentRef,
    pub amount: Decimal,
}

/// Validated shape of an `allocatePayment` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Client-chosen id; reusing one is rejected.
    pub payment_id: PaymentId,
    pub kind: PaymentKind,
    pub party_id: PartyId,
    pub payment_date: NaiveDate,
    pub allocations: Vec<AllocationRequest>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PaymentRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.allocations.is_empty() {
            return Err(DomainError::validation(
                "payment must settle at least one document",
            ));
        }
        let mut seen = HashSet::with_capacity(self.allocations.len());
        for allocation in &self.allocations {
            if allocation.amount <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "amount applied to {} must be positive",
                    allocation.target
                )));
            }
            if !seen.insert(allocation.target) {
                return Err(DomainError::validation(format!(
                    "{} is listed more than once",
                    allocation.target
                )));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> DomainResult<Decimal> {
        self.allocations.iter().try_fold(Decimal::ZERO, |acc, a| {
            acc.checked_add(a.amount)
                .ok_or_else(|| DomainError::invariant("payment amount overflow"))
        })
    }
}

/// One slice of a payment applied to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementAllocation {
    pub payment_id: PaymentId,
    pub target: DocumentRef,
    pub amount_applied: Decimal,
}

/// Check `requested` against a locked target and its applied total.
///
/// Returns the new applied total on success.
pub fn plan_allocation(
    target: &SettlementTarget,
    payer: PartyId,
    applied: Decimal,
    requested: Decimal,
) -> DomainResult<Decimal> {
    if target.party_id() != payer {
        return Err(DomainError::validation(format!(
            "{} belongs to a different party",
            target.document()
        )));
    }
    target.ensure_can_absorb(applied, requested)?;
    Ok(applied + requested)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub id: PaymentId,
    pub company_id: CompanyId,
    pub financial_year: FinancialYear,
    pub payment_no: String,
    pub kind: PaymentKind,
    pub party_id: PartyId,
    pub payment_date: NaiveDate,
    pub allocations: Vec<SettlementAllocation>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Payment with its allocations; persisted together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    company_id: CompanyId,
    financial_year: FinancialYear,
    payment_no: String,
    kind: PaymentKind,
    party_id: PartyId,
    amount: Decimal,
    payment_date: NaiveDate,
    allocations: Vec<SettlementAllocation>,
    notes: Option<String>,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl Payment {
    pub fn record(new: NewPayment) -> DomainResult<Self> {
        if new.allocations.is_empty() {
            return Err(DomainError::validation(
                "payment must settle at least one document",
            ));
        }
        if let Some(stray) = new.allocations.iter().find(|a| a.payment_id != new.id) {
            return Err(DomainError::invariant(format!(
                "allocation to {} belongs to payment {}",
                stray.target, stray.payment_id
            )));
        }
        let amount = new.allocations.iter().try_fold(Decimal::ZERO, |acc, a| {
            acc.checked_add(a.amount_applied)
                .ok_or_else(|| DomainError::invariant("payment amount overflow"))
        })?;
        Ok(Self {
            id: new.id,
            company_id: new.company_id,
            financial_year: new.financial_year,
            payment_no: new.payment_no,
            kind: new.kind,
            party_id: new.party_id,
            amount,
            payment_date: new.payment_date,
            allocations: new.allocations,
            notes: new.notes,
            created_by: new.created_by,
            created_at: new.created_at,
        })
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn financial_year(&self) -> &FinancialYear {
        &self.financial_year
    }

    pub fn payment_no(&self) -> &str {
        &self.payment_no
    }

    pub fn kind(&self) -> PaymentKind {
        self.kind
    }

    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn payment_date(&self) -> NaiveDate {
        self.payment_date
    }

    pub fn allocations(&self) -> &[SettlementAllocation] {
        &self.allocations
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Payment {
    type Id = PaymentId;

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
    use tradeledger_core::DocumentId;

    fn request(allocations: Vec<AllocationRequest>) -> PaymentRequest {
        PaymentRequest {
            payment_id: PaymentId::new(),
            kind: PaymentKind::Receipt,
            party_id: PartyId::new(),
            payment_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            allocations,
            notes: None,
        }
    }

    fn target(party: PartyId, gross: Decimal) -> SettlementTarget {
        SettlementTarget::new(
            DocumentRef::invoice(DocumentId::new()),
            CompanyId::new(),
            party,
            gross,
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn duplicate_target_is_rejected() {
        let doc = DocumentRef::invoice(DocumentId::new());
        let req = request(vec![
            AllocationRequest { target: doc, amount: dec!(10) },
            AllocationRequest { target: doc, amount: dec!(5) },
        ]);
        assert!(matches!(req.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn same_id_as_invoice_and_challan_is_two_targets() {
        let id = DocumentId::new();
        let req = request(vec![
            AllocationRequest { target: DocumentRef::invoice(id), amount: dec!(10) },
            AllocationRequest { target: DocumentRef::challan(id), amount: dec!(5) },
        ]);
        assert!(req.validate().is_ok());
        assert_eq!(req.total().unwrap(), dec!(15));
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let req = request(vec![AllocationRequest {
            target: DocumentRef::challan(DocumentId::new()),
            amount: dec!(0),
        }]);
        assert!(matches!(req.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn allocation_for_another_party_is_rejected() {
        let t = target(PartyId::new(), dec!(100));
        let err = plan_allocation(&t, PartyId::new(), dec!(0), dec!(10)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn payment_amount_is_sum_of_allocations() {
        let id = PaymentId::new();
        let payment = Payment::record(NewPayment {
            id,
            company_id: CompanyId::new(),
            financial_year: FinancialYear::parse("2025").unwrap(),
            payment_no: "REC-2025-0001".into(),
            kind: PaymentKind::Receipt,
            party_id: PartyId::new(),
            payment_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            allocations: vec![
                SettlementAllocation {
                    payment_id: id,
                    target: DocumentRef::invoice(DocumentId::new()),
                    amount_applied: dec!(120.50),
                },
                SettlementAllocation {
                    payment_id: id,
                    target: DocumentRef::challan(DocumentId::new()),
                    amount_applied: dec!(79.50),
                },
            ],
            notes: None,
            created_by: UserId::new(),
            created_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(payment.amount(), dec!(200));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: repeated allocations never push the applied total above gross,
            /// and a rejected allocation leaves the applied total unchanged.
            #[test]
            fn applied_total_never_exceeds_gross(
                gross_cents in 1i64..1_000_000,
                requests in proptest::collection::vec(1i64..300_000, 1..30)
            ) {
                let party = PartyId::new();
                let gross = Decimal::new(gross_cents, 2);
                let t = target(party, gross);
                let mut applied = Decimal::ZERO;

                for cents in requests {
                    let requested = Decimal::new(cents, 2);
                    match plan_allocation(&t, party, applied, requested) {
                        Ok(next) => {
                            prop_assert_eq!(next, applied + requested);
                            applied = next;
                        }
                        Err(DomainError::OverAllocation { .. }) => {
                            prop_assert!(applied + requested > gross);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                    }
                    prop_assert!(applied <= gross);
                }
            }
        }
    }
}
