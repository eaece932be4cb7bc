use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeledger_core::{CompanyId, PartyId, Quantity, StockUnitId, TransferId};
use tradeledger_events::Event;

/// Event: StockUnitReceived (purchase entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUnitReceived {
    pub company_id: CompanyId,
    pub stock_unit_id: StockUnitId,
    pub challan_no: String,
    pub party_id: PartyId,
    pub quantity: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCompleted {
    pub company_id: CompanyId,
    pub transfer_id: TransferId,
    pub transfer_no: String,
    pub source_stock_unit_id: StockUnitId,
    pub recipient_stock_unit_ids: Vec<StockUnitId>,
    pub total: Quantity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferReversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReversed {
    pub company_id: CompanyId,
    pub transfer_id: TransferId,
    pub source_stock_unit_id: StockUnitId,
    pub restored: Quantity,
    pub deactivated_stock_unit_ids: Vec<StockUnitId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    StockUnitReceived(StockUnitReceived),
    TransferCompleted(TransferCompleted),
    TransferReversed(TransferReversed),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockUnitReceived(_) => "inventory.stock_unit.received",
            InventoryEvent::TransferCompleted(_) => "inventory.transfer.completed",
            InventoryEvent::TransferReversed(_) => "inventory.transfer.reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockUnitReceived(e) => e.occurred_at,
            InventoryEvent::TransferCompleted(e) => e.occurred_at,
            InventoryEvent::TransferReversed(e) => e.occurred_at,
        }
    }
}
