//! Transactional ledger storage boundary.
//!
//! Stock units, transfers, settlement targets and payments live behind
//! [`LedgerStore`]. All mutual exclusion is delegated to the backing store's
//! transactions and row locks; the engine holds no locks of its own.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryLedgerStore, InMemoryLedgerTransaction};
pub use postgres::{PostgresLedgerStore, PostgresLedgerTransaction};
pub use r#trait::{LedgerStore, LedgerTransaction, StoreError};
