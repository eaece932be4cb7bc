//! `tradeledger-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the inventory and
//! settlement modules (no infrastructure concerns).

pub mod context;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use context::EngineContext;
pub use entity::Entity;
pub use error::{DomainError, DomainResult, QuantityUnit};
pub use id::{CompanyId, DocumentId, PartyId, PaymentId, StockUnitId, TransferId, UserId};
pub use value_object::{FinancialYear, Quantity};
