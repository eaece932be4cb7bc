use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeledger_core::{CompanyId, PartyId, PaymentId};
use tradeledger_events::Event;

use crate::payment::{PaymentKind, SettlementAllocation};
use crate::target::DocumentRef;

/// Event: SettlementTargetRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTargetRegistered {
    pub company_id: CompanyId,
    pub document: DocumentRef,
    pub gross_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAllocated {
    pub company_id: CompanyId,
    pub payment_id: PaymentId,
    pub payment_no: String,
    pub kind: PaymentKind,
    pub party_id: PartyId,
    pub amount: Decimal,
    pub allocations: Vec<SettlementAllocation>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementEvent {
    TargetRegistered(SettlementTargetRegistered),
    PaymentAllocated(PaymentAllocated),
}

impl Event for SettlementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SettlementEvent::TargetRegistered(_) => "settlement.target.registered",
            SettlementEvent::PaymentAllocated(_) => "settlement.payment.allocated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SettlementEvent::TargetRegistered(e) => e.occurred_at,
            SettlementEvent::PaymentAllocated(e) => e.occurred_at,
        }
    }
}
