//! Engine operations.
//!
//! Each service owns a store, a sequence generator and an audit sink. An
//! operation opens one store transaction, commits it, and only then hands an
//! audit record to the sink.

pub mod ledger;
pub mod settlement;
pub mod transfers;

use tradeledger_core::{CompanyId, EngineContext, FinancialYear};

use crate::error::EngineError;
use crate::sequence::{DocumentType, SequenceGenerator, SequenceScope, format_document_number};

pub use ledger::InventoryLedger;
pub use settlement::SettlementEngine;
pub use transfers::TransferOrchestrator;

/// Zero-padding width used when none is configured.
pub const DEFAULT_NUMBER_WIDTH: usize = 4;

/// Draw the next number for `document_type` in the context's company and year.
///
/// The draw is committed independently of the caller's transaction; a number
/// whose document is rolled back is skipped, never reissued.
pub(crate) async fn issue_number<Q>(
    sequences: &Q,
    ctx: &EngineContext,
    document_type: DocumentType,
    width: usize,
) -> Result<String, EngineError>
where
    Q: SequenceGenerator + ?Sized,
{
    issue_number_in(
        sequences,
        ctx.company_id(),
        ctx.financial_year(),
        document_type,
        width,
    )
    .await
}

/// Same as [`issue_number`] for an explicit financial year.
pub(crate) async fn issue_number_in<Q>(
    sequences: &Q,
    company_id: CompanyId,
    financial_year: &FinancialYear,
    document_type: DocumentType,
    width: usize,
) -> Result<String, EngineError>
where
    Q: SequenceGenerator + ?Sized,
{
    let scope = SequenceScope::new(company_id, financial_year.clone(), document_type);
    let value = sequences.next(&scope).await?;
    Ok(format_document_number(&scope, value, width))
}
