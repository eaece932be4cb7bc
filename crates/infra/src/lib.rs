//! Infrastructure layer: stores, document numbering, configuration and the
//! engine services that tie them to the domain crates.

pub mod config;
pub mod error;
pub mod sequence;
pub mod services;
pub mod store;


pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use services::{InventoryLedger, SettlementEngine, TransferOrchestrator};
