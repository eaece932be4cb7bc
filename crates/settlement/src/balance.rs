//! Balances, payment status and overdue interest.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use tradeledger_core::{DomainError, DomainResult};

use crate::target::{DocumentRef, SettlementTarget, validate_terms};

const DAYS_PER_YEAR: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Unpaid,
    Partial,
    Paid,
}

impl SettlementStatus {
    pub fn derive(gross: Decimal, paid: Decimal) -> Self {
        if paid >= gross {
            SettlementStatus::Paid
        } else if paid > Decimal::ZERO {
            SettlementStatus::Partial
        } else {
            SettlementStatus::Unpaid
        }
    }
}

/// Simple (non-compounding) interest on an overdue balance.
///
/// `outstanding * annual_rate * max(0, days_overdue) / 365`, rounded to cents.
/// `annual_rate` is a fraction (`0.18` for 18%).
pub fn overdue_interest(
    due_date: NaiveDate,
    outstanding: Decimal,
    as_of: NaiveDate,
    annual_rate: Decimal,
) -> DomainResult<Decimal> {
    if outstanding <= Decimal::ZERO || annual_rate <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let days = (as_of - due_date).num_days().max(0);
    if days == 0 {
        return Ok(Decimal::ZERO);
    }
    let overflow = || DomainError::invariant("interest computation overflow");
    let interest = outstanding
        .checked_mul(annual_rate)
        .and_then(|v| v.checked_mul(Decimal::from(days)))
        .and_then(|v| v.checked_div(Decimal::from(DAYS_PER_YEAR)))
        .ok_or_else(overflow)?;
    Ok(interest.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// A document submitted for enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementDocument {
    pub document: DocumentRef,
    pub gross_amount: Decimal,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub annual_interest_rate: Option<Decimal>,
}

impl SettlementDocument {
    /// Same rules as a registered target.
    pub fn validate(&self) -> DomainResult<()> {
        validate_terms(self.document, self.gross_amount, self.annual_interest_rate)
    }
}

impl From<&SettlementTarget> for SettlementDocument {
    fn from(target: &SettlementTarget) -> Self {
        Self {
            document: target.document(),
            gross_amount: target.gross_amount(),
            due_date: target.due_date(),
            annual_interest_rate: target.annual_interest_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedDocument {
    #[serde(flatten)]
    pub document: SettlementDocument,
    pub paid_amount: Decimal,
    pub outstanding_amount: Decimal,
    pub status: SettlementStatus,
    pub interest: Decimal,
}

/// Attach paid/outstanding/status/interest to each document, in input order.
///
/// `paid` comes from one bulk read keyed by the documents; missing entries
/// mean nothing has been applied yet. Any invalid document rejects the batch.
pub fn enrich(
    documents: Vec<SettlementDocument>,
    paid: &HashMap<DocumentRef, Decimal>,
    as_of: NaiveDate,
) -> DomainResult<Vec<EnrichedDocument>> {
    documents.iter().try_for_each(SettlementDocument::validate)?;
    documents
        .into_iter()
        .map(|document| {
            let paid_amount = paid.get(&document.document).copied().unwrap_or_default();
            let outstanding_amount = document
                .gross_amount
                .checked_sub(paid_amount)
                .ok_or_else(|| {
                    DomainError::invariant(format!(
                        "outstanding balance of {} overflows",
                        document.document
                    ))
                })?
                .max(Decimal::ZERO);
            let interest = match (document.due_date, document.annual_interest_rate) {
                (Some(due), Some(rate)) => overdue_interest(due, outstanding_amount, as_of, rate)?,
                _ => Decimal::ZERO,
            };
            Ok(EnrichedDocument {
                status: SettlementStatus::derive(document.gross_amount, paid_amount),
                document,
                paid_amount,
                outstanding_amount,
                interest,
            })
        })
        .collect()
}
