use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{
    CompanyId, DomainError, DomainResult, Entity, FinancialYear, PartyId, Quantity, StockUnitId,
    TransferId, UserId,
};

/// One recipient line of a transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRequest {
    pub party_id: PartyId,
    pub boxes: i64,
    pub meters: Decimal,
}

impl RecipientRequest {
    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.boxes, self.meters)
    }
}

/// Validated shape of a `createTransfer` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_stock_unit_id: StockUnitId,
    pub recipients: Vec<RecipientRequest>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransferRequest {
    const MAX_TEXT_LEN: usize = 500;

    pub fn validate(&self) -> DomainResult<()> {
        if self.recipients.is_empty() {
            return Err(DomainError::validation(
                "transfer must have at least one recipient",
            ));
        }
        for (idx, recipient) in self.recipients.iter().enumerate() {
            recipient
                .quantity()
                .ensure_positive(&format!("recipient {}", idx + 1))?;
        }
        for (field, value) in [("reason", &self.reason), ("notes", &self.notes)] {
            if value.as_deref().is_some_and(|v| v.len() > Self::MAX_TEXT_LEN) {
                return Err(DomainError::validation(format!(
                    "{field} must be at most {} characters",
                    Self::MAX_TEXT_LEN
                )));
            }
        }
        Ok(())
    }

    /// Sum of all recipient quantities.
    pub fn total_requested(&self) -> DomainResult<Quantity> {
        self.recipients
            .iter()
            .try_fold(Quantity::ZERO, |acc, r| acc.checked_add(r.quantity()))
    }
}

/// A recipient as recorded on a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecipient {
    pub party_id: PartyId,
    pub boxes: i64,
    pub meters: Decimal,
    pub created_stock_unit_id: StockUnitId,
    pub challan_no: String,
}

impl TransferRecipient {
    pub fn quantity(&self) -> Quantity {
        Quantity::new(self.boxes, self.meters)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Completed,
    Reversed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Completed => "completed",
            TransferStatus::Reversed => "reversed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(TransferStatus::Completed),
            "reversed" => Some(TransferStatus::Reversed),
            _ => None,
        }
    }
}

/// Fields of a transfer at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub id: TransferId,
    pub company_id: CompanyId,
    pub financial_year: FinancialYear,
    pub transfer_no: String,
    pub source_stock_unit_id: StockUnitId,
    pub source_party_id: PartyId,
    pub recipients: Vec<TransferRecipient>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Transfer: one source stock unit split across one or more recipients.
///
/// State machine: `Completed -> Reversed`, terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    id: TransferId,
    company_id: CompanyId,
    financial_year: FinancialYear,
    transfer_no: String,
    source_stock_unit_id: StockUnitId,
    source_party_id: PartyId,
    recipients: Vec<TransferRecipient>,
    total: Quantity,
    reason: Option<String>,
    notes: Option<String>,
    status: TransferStatus,
    created_by: UserId,
    created_at: DateTime<Utc>,
    reversed_by: Option<UserId>,
    reversed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    pub fn create(new: NewTransfer) -> DomainResult<Self> {
        if new.recipients.is_empty() {
            return Err(DomainError::validation(
                "transfer must have at least one recipient",
            ));
        }
        let total = new
            .recipients
            .iter()
            .try_fold(Quantity::ZERO, |acc, r| acc.checked_add(r.quantity()))?;
        Ok(Self {
            id: new.id,
            company_id: new.company_id,
            financial_year: new.financial_year,
            transfer_no: new.transfer_no,
            source_stock_unit_id: new.source_stock_unit_id,
            source_party_id: new.source_party_id,
            recipients: new.recipients,
            total,
            reason: new.reason,
            notes: new.notes,
            status: TransferStatus::Completed,
            created_by: new.created_by,
            created_at: new.created_at,
            reversed_by: None,
            reversed_at: None,
        })
    }

    /// Rebuild from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn restore_from_storage(
        id: TransferId,
        company_id: CompanyId,
        financial_year: FinancialYear,
        transfer_no: String,
        source_stock_unit_id: StockUnitId,
        source_party_id: PartyId,
        recipients: Vec<TransferRecipient>,
        reason: Option<String>,
        notes: Option<String>,
        status: TransferStatus,
        created_by: UserId,
        created_at: DateTime<Utc>,
        reversed_by: Option<UserId>,
        reversed_at: Option<DateTime<Utc>>,
    ) -> DomainResult<Self> {
        let mut transfer = Self::create(NewTransfer {
            id,
            company_id,
            financial_year,
            transfer_no,
            source_stock_unit_id,
            source_party_id,
            recipients,
            reason,
            notes,
            created_by,
            created_at,
        })?;
        transfer.status = status;
        transfer.reversed_by = reversed_by;
        transfer.reversed_at = reversed_at;
        Ok(transfer)
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn financial_year(&self) -> &FinancialYear {
        &self.financial_year
    }

    pub fn transfer_no(&self) -> &str {
        &self.transfer_no
    }

    pub fn source_stock_unit_id(&self) -> StockUnitId {
        self.source_stock_unit_id
    }

    pub fn source_party_id(&self) -> PartyId {
        self.source_party_id
    }

    pub fn recipients(&self) -> &[TransferRecipient] {
        &self.recipients
    }

    pub fn total(&self) -> Quantity {
        self.total
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn is_reversed(&self) -> bool {
        self.status == TransferStatus::Reversed
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn reversed_by(&self) -> Option<UserId> {
        self.reversed_by
    }

    pub fn reversed_at(&self) -> Option<DateTime<Utc>> {
        self.reversed_at
    }

    pub fn ensure_not_reversed(&self) -> DomainResult<()> {
        if self.is_reversed() {
            return Err(DomainError::AlreadyReversed(self.id));
        }
        Ok(())
    }

    pub fn reverse(&mut self, actor: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_reversed()?;
        self.status = TransferStatus::Reversed;
        self.reversed_by = Some(actor);
        self.reversed_at = Some(at);
        Ok(())
    }
}

impl Entity for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn company_id(&self) -> CompanyId {
        self.company_id
    }
}
