//! Inventory domain module.
//!
//! Stock units (challans), transfers and their lineage, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod event;
pub mod lineage;
pub mod stock_unit;
pub mod transfer;

pub use event::{InventoryEvent, StockUnitReceived, TransferCompleted, TransferReversed};
pub use lineage::{Lineage, LineageEdge, LineageNode, LineageUnit};
pub use stock_unit::{Depletion, NewPurchase, NewTransferReceipt, StockUnit, StockUnitStatus};
pub use transfer::{
    NewTransfer, RecipientRequest, Transfer, TransferRecipient, TransferRequest, TransferStatus,
};
