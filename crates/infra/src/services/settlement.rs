//! Payment allocation and settlement balances.

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use tradeledger_core::{EngineContext, PaymentId};
use tradeledger_events::{AuditRecord, AuditSink, emit_best_effort};
use tradeledger_settlement::{
    AllocationRequest, DocumentRef, EnrichedDocument, NewPayment, Payment, PaymentAllocated,
    PaymentKind, PaymentRequest, SettlementAllocation, SettlementDocument, SettlementEvent,
    SettlementTarget, SettlementTargetRegistered, TargetRegistration, enrich, plan_allocation,
};

use crate::error::EngineError;
use crate::sequence::{DocumentType, SequenceGenerator};
use crate::store::LedgerStore;

use super::{DEFAULT_NUMBER_WIDTH, issue_number};

pub struct SettlementEngine<S, Q, A> {
    store: S,
    sequences: Q,
    audit: A,
    number_width: usize,
}

impl<S, Q, A> SettlementEngine<S, Q, A>
where
    S: LedgerStore,
    Q: SequenceGenerator,
    A: AuditSink,
{
    pub fn new(store: S, sequences: Q, audit: A) -> Self {
        Self {
            store,
            sequences,
            audit,
            number_width: DEFAULT_NUMBER_WIDTH,
        }
    }

    pub fn with_number_width(mut self, width: usize) -> Self {
        self.number_width = width;
        self
    }

    /// Create or update the terms of an invoice or challan.
    ///
    /// The gross amount may not drop below what has already been applied.
    #[instrument(
        skip(self, ctx, registration),
        fields(company_id = %ctx.company_id(), document = %registration.document),
        err
    )]
    pub async fn register_target(
        &self,
        ctx: &EngineContext,
        registration: TargetRegistration,
    ) -> Result<SettlementTarget, EngineError> {
        let company_id = ctx.company_id();
        let document = registration.document;
        let replacement = registration.into_target(company_id)?;

        let mut tx = self.store.begin().await?;
        let previous = tx.settlement_target_for_update(company_id, document).await?;
        let target = match previous.clone() {
            Some(mut existing) => {
                let applied = tx.applied_total(company_id, document).await?;
                existing.update_terms(replacement, applied)?;
                existing
            }
            None => replacement,
        };
        tx.upsert_settlement_target(&target).await?;
        tx.commit().await?;

        let event = SettlementEvent::TargetRegistered(SettlementTargetRegistered {
            company_id,
            document,
            gross_amount: target.gross_amount(),
            occurred_at: Utc::now(),
        });
        let mut record = AuditRecord::from_event(
            company_id,
            ctx.actor_id(),
            "settlement_target",
            document.id.into(),
            &event,
        )
        .with_after(&target);
        if let Some(previous) = &previous {
            record = record.with_before(previous);
        }
        emit_best_effort(&self.audit, record);

        Ok(target)
    }

    /// Record a payment and its allocations in one transaction.
    ///
    /// Each target is locked before its applied total is read, so concurrent
    /// payments against one document cannot jointly exceed its gross amount.
    #[instrument(
        skip(self, ctx, request),
        fields(
            company_id = %ctx.company_id(),
            payment_id = %request.payment_id,
            allocations = request.allocations.len()
        ),
        err
    )]
    pub async fn allocate_payment(
        &self,
        ctx: &EngineContext,
        request: PaymentRequest,
    ) -> Result<Payment, EngineError> {
        request.validate()?;
        let company_id = ctx.company_id();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        if tx.payment_exists(company_id, request.payment_id).await? {
            return Err(EngineError::invalid(format!(
                "payment {} already exists",
                request.payment_id
            )));
        }

        // Lock in a fixed order; results do not depend on it.
        let mut ordered: Vec<&AllocationRequest> = request.allocations.iter().collect();
        ordered.sort_by_key(|a| a.target);
        for allocation in ordered {
            let target = tx
                .settlement_target_for_update(company_id, allocation.target)
                .await?
                .ok_or_else(|| EngineError::not_found(allocation.target.to_string()))?;
            let applied = tx.applied_total(company_id, allocation.target).await?;
            plan_allocation(&target, request.party_id, applied, allocation.amount)?;
        }

        let document_type = match request.kind {
            PaymentKind::Receipt => DocumentType::Receipt,
            PaymentKind::Payment => DocumentType::Payment,
        };
        let payment_no =
            issue_number(&self.sequences, ctx, document_type, self.number_width).await?;

        let allocations = request
            .allocations
            .iter()
            .map(|a| SettlementAllocation {
                payment_id: request.payment_id,
                target: a.target,
                amount_applied: a.amount,
            })
            .collect();
        let payment = Payment::record(NewPayment {
            id: request.payment_id,
            company_id,
            financial_year: ctx.financial_year().clone(),
            payment_no,
            kind: request.kind,
            party_id: request.party_id,
            payment_date: request.payment_date,
            allocations,
            notes: request.notes,
            created_by: ctx.actor_id(),
            created_at: now,
        })?;
        tx.insert_payment(&payment).await?;
        tx.commit().await?;

        info!(
            payment_no = payment.payment_no(),
            amount = %payment.amount(),
            "payment allocated"
        );
        let event = SettlementEvent::PaymentAllocated(PaymentAllocated {
            company_id,
            payment_id: payment.id_typed(),
            payment_no: payment.payment_no().to_string(),
            kind: payment.kind(),
            party_id: payment.party_id(),
            amount: payment.amount(),
            allocations: payment.allocations().to_vec(),
            occurred_at: now,
        });
        let record = AuditRecord::from_event(
            company_id,
            ctx.actor_id(),
            "payment",
            payment.id_typed().into(),
            &event,
        )
        .with_after(&payment);
        emit_best_effort(&self.audit, record);

        Ok(payment)
    }

    /// Attach paid, outstanding, status and interest to each document.
    ///
    /// Issues exactly one read against the allocation store.
    #[instrument(
        skip(self, ctx, documents),
        fields(company_id = %ctx.company_id(), documents = documents.len()),
        err
    )]
    pub async fn enrich_with_payments(
        &self,
        ctx: &EngineContext,
        documents: Vec<SettlementDocument>,
        as_of: NaiveDate,
    ) -> Result<Vec<EnrichedDocument>, EngineError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        documents.iter().try_for_each(SettlementDocument::validate)?;
        let keys: Vec<DocumentRef> = documents.iter().map(|d| d.document).collect();
        let paid = self.store.applied_totals(ctx.company_id(), &keys).await?;
        Ok(enrich(documents, &paid, as_of)?)
    }

    pub async fn target(
        &self,
        ctx: &EngineContext,
        document: DocumentRef,
    ) -> Result<SettlementTarget, EngineError> {
        self.store
            .settlement_target(ctx.company_id(), document)
            .await?
            .ok_or_else(|| EngineError::not_found(document.to_string()))
    }

    pub async fn payment(
        &self,
        ctx: &EngineContext,
        payment_id: PaymentId,
    ) -> Result<Payment, EngineError> {
        self.store
            .payment(ctx.company_id(), payment_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("payment {payment_id}")))
    }
}
