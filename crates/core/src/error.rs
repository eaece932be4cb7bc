//! Domain error model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{DocumentId, TransferId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Dimension in which a stock quantity is measured.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityUnit {
    Boxes,
    Meters,
}

impl core::fmt::Display for QuantityUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            QuantityUnit::Boxes => f.write_str("boxes"),
            QuantityUnit::Meters => f.write_str("meters"),
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, state preconditions). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A reservation asked for more than the stock unit has available.
    #[error("only {available} {unit} available, {requested} requested")]
    InsufficientInventory {
        unit: QuantityUnit,
        available: Decimal,
        requested: Decimal,
    },

    /// The transfer has already been reversed.
    #[error("transfer {0} is already reversed")]
    AlreadyReversed(TransferId),

    /// The transfer can no longer be reversed.
    #[error("transfer cannot be reversed: {0}")]
    NotReversible(String),

    /// Applying the amount would settle more than the target's gross amount.
    #[error(
        "allocation of {requested} to {target} exceeds outstanding {outstanding} (gross {gross}, applied {applied})"
    )]
    OverAllocation {
        target: DocumentId,
        gross: Decimal,
        applied: Decimal,
        outstanding: Decimal,
        requested: Decimal,
    },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_reversible(msg: impl Into<String>) -> Self {
        Self::NotReversible(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient(unit: QuantityUnit, available: Decimal, requested: Decimal) -> Self {
        Self::InsufficientInventory {
            unit,
            available,
            requested,
        }
    }
}
