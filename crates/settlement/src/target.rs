use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{CompanyId, DocumentId, DomainError, DomainResult, Entity, PartyId};

/// Kind of document a payment can settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Invoice,
    Challan,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Invoice => "invoice",
            TargetType::Challan => "challan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(TargetType::Invoice),
            "challan" => Some(TargetType::Challan),
            _ => None,
        }
    }
}

/// Typed reference to an invoice or challan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: DocumentId,
    pub target_type: TargetType,
}

impl DocumentRef {
    pub fn invoice(id: DocumentId) -> Self {
        Self {
            id,
            target_type: TargetType::Invoice,
        }
    }

    pub fn challan(id: DocumentId) -> Self {
        Self {
            id,
            target_type: TargetType::Challan,
        }
    }
}

impl core::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.target_type.as_str(), self.id)
    }
}

/// Terms of an invoice or challan as submitted by the invoicing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegistration {
    pub document: DocumentRef,
    pub party_id: PartyId,
    pub gross_amount: Decimal,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub annual_interest_rate: Option<Decimal>,
}

impl TargetRegistration {
    pub fn into_target(self, company_id: CompanyId) -> DomainResult<SettlementTarget> {
        SettlementTarget::new(
            self.document,
            company_id,
            self.party_id,
            self.gross_amount,
            self.due_date,
            self.annual_interest_rate,
        )
    }
}

/// Invoice or challan as registered by the invoicing layer.
///
/// The gross amount is the ceiling for everything ever applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTarget {
    document: DocumentRef,
    company_id: CompanyId,
    party_id: PartyId,
    gross_amount: Decimal,
    due_date: Option<NaiveDate>,
    /// Fraction per annum (`0.18` = 18%).
    annual_interest_rate: Option<Decimal>,
}

impl SettlementTarget {
    pub fn new(
        document: DocumentRef,
        company_id: CompanyId,
        party_id: PartyId,
        gross_amount: Decimal,
        due_date: Option<NaiveDate>,
        annual_interest_rate: Option<Decimal>,
    ) -> DomainResult<Self> {
        validate_terms(document, gross_amount, annual_interest_rate)?;
        Ok(Self {
            document,
            company_id,
            party_id,
            gross_amount,
            due_date,
            annual_interest_rate,
        })
    }

    pub fn document(&self) -> DocumentRef {
        self.document
    }

    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn gross_amount(&self) -> Decimal {
        self.gross_amount
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn annual_interest_rate(&self) -> Option<Decimal> {
        self.annual_interest_rate
    }

    /// Gross minus applied, floored at zero.
    pub fn outstanding(&self, applied: Decimal) -> Decimal {
        (self.gross_amount - applied).max(Decimal::ZERO)
    }

    /// Fail with `OverAllocation` unless `requested` fits on top of `applied`.
    pub fn ensure_can_absorb(&self, applied: Decimal, requested: Decimal) -> DomainResult<()> {
        let cumulative = applied
            .checked_add(requested)
            .ok_or_else(|| DomainError::invariant("settlement amount overflow"))?;
        if cumulative > self.gross_amount {
            return Err(DomainError::OverAllocation {
                target: self.document.id,
                gross: self.gross_amount,
                applied,
                outstanding: self.outstanding(applied),
                requested,
            });
        }
        Ok(())
    }

    /// Replace the registered terms. The new gross may not drop below `applied`.
    pub fn update_terms(&mut self, replacement: SettlementTarget, applied: Decimal) -> DomainResult<()> {
        if replacement.document != self.document || replacement.company_id != self.company_id {
            return Err(DomainError::invariant(format!(
                "cannot replace terms of {} with those of {}",
                self.document, replacement.document
            )));
        }
        if replacement.party_id != self.party_id && applied > Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "{} already has payments applied; its party cannot change",
                self.document
            )));
        }
        if replacement.gross_amount < applied {
            return Err(DomainError::OverAllocation {
                target: self.document.id,
                gross: replacement.gross_amount,
                applied,
                outstanding: Decimal::ZERO,
                requested: Decimal::ZERO,
            });
        }
        *self = replacement;
        Ok(())
    }
}

impl Entity for SettlementTarget {
    type Id = DocumentRef;

    fn id(&self) -> &Self::Id {
        &self.document
    }

    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}

/// Gross must be positive; a rate, when given, must not be negative.
pub(crate) fn validate_terms(
    document: DocumentRef,
    gross_amount: Decimal,
    annual_interest_rate: Option<Decimal>,
) -> DomainResult<()> {
    if gross_amount <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "gross amount of {document} must be positive"
        )));
    }
    if annual_interest_rate.is_some_and(|r| r < Decimal::ZERO) {
        return Err(DomainError::validation(format!(
            "annual interest rate of {document} cannot be negative"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn target(gross: Decimal) -> SettlementTarget {
        SettlementTarget::new(
            DocumentRef::invoice(DocumentId::new()),
            CompanyId::new(),
            PartyId::new(),
            gross,
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn gross_must_be_positive() {
        let err = SettlementTarget::new(
            DocumentRef::challan(DocumentId::new()),
            CompanyId::new(),
            PartyId::new(),
            dec!(0),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn absorbs_up_to_gross_exactly() {
        let t = target(dec!(200));
        assert!(t.ensure_can_absorb(dec!(50), dec!(150)).is_ok());
        let err = t.ensure_can_absorb(dec!(50), dec!(150.01)).unwrap_err();
        match err {
            DomainError::OverAllocation {
                outstanding,
                requested,
                ..
            } => {
                assert_eq!(outstanding, dec!(150));
                assert_eq!(requested, dec!(150.01));
            }
            other => panic!("expected OverAllocation, got {other:?}"),
        }
    }

    #[test]
    fn gross_cannot_drop_below_applied() {
        let mut t = target(dec!(200));
        let mut lowered = t.clone();
        lowered.gross_amount = dec!(99);
        let err = t.update_terms(lowered, dec!(100)).unwrap_err();
        assert!(matches!(err, DomainError::OverAllocation { .. }));
        assert_eq!(t.gross_amount(), dec!(200));
    }

    #[test]
    fn document_ref_wire_shape() {
        let id = DocumentId::new();
        let json = serde_json::to_value(DocumentRef::challan(id)).unwrap();
        assert_eq!(json["target_type"], "challan");
        assert_eq!(json["id"], id.to_string());
    }
}
