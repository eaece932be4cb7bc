//! Engine error taxonomy.
//!
//! Every engine operation returns `EngineError`. Domain and store failures are
//! folded into it here so callers only ever match one enum.

use rust_decimal::Decimal;
use thiserror::Error;

use tradeledger_core::{DocumentId, DomainError, QuantityUnit, TransferId};

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input; the caller's fault.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("only {available} {unit} available, {requested} requested")]
    InsufficientInventory {
        unit: QuantityUnit,
        available: Decimal,
        requested: Decimal,
    },

    #[error("transfer {0} is already reversed")]
    AlreadyReversed(TransferId),

    #[error("transfer cannot be reversed: {0}")]
    TransferNotReversible(String),

    #[error(
        "cannot apply {requested} to document {target}: outstanding is {outstanding} (gross {gross}, already applied {applied})"
    )]
    OverAllocation {
        target: DocumentId,
        gross: Decimal,
        applied: Decimal,
        outstanding: Decimal,
        requested: Decimal,
    },

    /// A consistency check failed: a bug or corrupted data.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Transient conflict or timeout; nothing was committed, retry the whole call.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Build an invariant violation, logging its full detail.
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(detail = %msg, "ledger invariant violated");
        Self::InvariantViolation(msg)
    }

    /// Only `TransactionFailed` may be retried with the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransactionFailed(_))
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::InsufficientInventory { .. } => "insufficient_inventory",
            EngineError::AlreadyReversed(_) => "already_reversed",
            EngineError::TransferNotReversible(_) => "transfer_not_reversible",
            EngineError::OverAllocation { .. } => "over_allocation",
            EngineError::InvariantViolation(_) => "internal_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::TransactionFailed(_) => "transaction_failed",
            EngineError::Store(_) => "internal_error",
        }
    }

    /// Message safe to show the caller. Internal failures are not described.
    pub fn public_message(&self) -> String {
        match self {
            EngineError::InvariantViolation(_) | EngineError::Store(_) => {
                "internal error".to_string()
            }
            EngineError::TransactionFailed(_) => {
                "the operation conflicted with another request; retry it".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                EngineError::InvalidRequest(msg)
            }
            DomainError::InsufficientInventory {
                unit,
                available,
                requested,
            } => EngineError::InsufficientInventory {
                unit,
                available,
                requested,
            },
            DomainError::AlreadyReversed(id) => EngineError::AlreadyReversed(id),
            DomainError::NotReversible(msg) => EngineError::TransferNotReversible(msg),
            DomainError::OverAllocation {
                target,
                gross,
                applied,
                outstanding,
                requested,
            } => EngineError::OverAllocation {
                target,
                gross,
                applied,
                outstanding,
                requested,
            },
            DomainError::InvariantViolation(msg) => EngineError::invariant(msg),
            DomainError::NotFound => EngineError::NotFound("resource".to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => EngineError::NotFound(what),
            // A concurrent duplicate lost a uniqueness race; the retry sees the winner.
            StoreError::TransactionFailed(msg) | StoreError::Conflict(msg) => {
                EngineError::TransactionFailed(msg)
            }
            StoreError::Serialization(msg) => {
                EngineError::invariant(format!("stored data is corrupt: {msg}"))
            }
            other @ StoreError::Backend(_) => {
                tracing::error!(error = %other, "ledger store failure");
                EngineError::Store(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_inventory_is_surfaced_verbatim() {
        let err: EngineError = DomainError::insufficient(
            QuantityUnit::Boxes,
            Decimal::from(40),
            Decimal::from(60),
        )
        .into();
        assert_eq!(err.code(), "insufficient_inventory");
        assert_eq!(err.public_message(), "only 40 boxes available, 60 requested");
        assert!(!err.is_retryable());
    }

    #[test]
    fn invariant_detail_is_hidden() {
        let err: EngineError = DomainError::invariant("available 7 > total 5").into();
        assert_eq!(err.public_message(), "internal error");
        assert!(err.to_string().contains("available 7 > total 5"));
    }

    #[test]
    fn only_transaction_failures_are_retryable() {
        let err: EngineError = StoreError::TransactionFailed("deadlock".into()).into();
        assert!(err.is_retryable());
        let err: EngineError = StoreError::Conflict("duplicate".into()).into();
        assert!(err.is_retryable());
        let err: EngineError = StoreError::Backend("connection reset".into()).into();
        assert!(!err.is_retryable());
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn validation_becomes_invalid_request() {
        let err: EngineError = DomainError::validation("empty recipient list").into();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert_eq!(err.code(), "invalid_request");
    }
}
