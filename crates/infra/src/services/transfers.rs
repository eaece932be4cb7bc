//! Purchase entry, transfers, reversal and lineage.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::{info, instrument};

use tradeledger_core::{DocumentId, EngineContext, PartyId, Quantity, StockUnitId, TransferId};
use tradeledger_events::{AuditRecord, AuditSink, emit_best_effort};
use tradeledger_inventory::{
    InventoryEvent, Lineage, NewPurchase, NewTransfer, NewTransferReceipt, StockUnit,
    StockUnitReceived, Transfer, TransferCompleted, TransferRecipient, TransferRequest,
    TransferReversed,
};

use crate::error::EngineError;
use crate::sequence::{DocumentType, SequenceGenerator};
use crate::store::LedgerStore;

use super::{DEFAULT_NUMBER_WIDTH, InventoryLedger, issue_number, issue_number_in};

/// Runs every stock-unit mutation as a single store transaction.
///
/// - `S`: ledger store
/// - `Q`: document number source
/// - `A`: audit sink, called after commit
pub struct TransferOrchestrator<S, Q, A> {
    store: S,
    sequences: Q,
    audit: A,
    ledger: InventoryLedger,
    number_width: usize,
}

impl<S, Q, A> TransferOrchestrator<S, Q, A>
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
            ledger: InventoryLedger::new(),
            number_width: DEFAULT_NUMBER_WIDTH,
        }
    }

    pub fn with_number_width(mut self, width: usize) -> Self {
        self.number_width = width;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record purchased material as a new active stock unit.
    #[instrument(skip(self, ctx), fields(company_id = %ctx.company_id(), party_id = %party_id), err)]
    pub async fn record_purchase(
        &self,
        ctx: &EngineContext,
        party_id: PartyId,
        quantity: Quantity,
    ) -> Result<StockUnit, EngineError> {
        quantity.ensure_positive("purchase")?;

        let challan_no = self.number(ctx, DocumentType::Challan).await?;
        let now = Utc::now();
        let unit = StockUnit::purchased(NewPurchase {
            id: StockUnitId::new(),
            company_id: ctx.company_id(),
            financial_year: ctx.financial_year().clone(),
            challan_no,
            party_id,
            quantity,
            received_at: now,
        })?;

        let mut tx = self.store.begin().await?;
        tx.insert_stock_unit(&unit).await?;
        tx.commit().await?;

        info!(stock_unit_id = %unit.id_typed(), challan_no = unit.challan_no(), "stock unit received");
        let event = InventoryEvent::StockUnitReceived(StockUnitReceived {
            company_id: ctx.company_id(),
            stock_unit_id: unit.id_typed(),
            challan_no: unit.challan_no().to_string(),
            party_id,
            quantity,
            occurred_at: now,
        });
        let record = AuditRecord::from_event(
            ctx.company_id(),
            ctx.actor_id(),
            "stock_unit",
            unit.id_typed().into(),
            &event,
        )
        .with_after(&unit);
        emit_best_effort(&self.audit, record);

        Ok(unit)
    }

    /// Split a source unit across one or more recipients.
    ///
    /// Either every recipient unit, the source debit and the transfer record
    /// commit together, or nothing does.
    #[instrument(
        skip(self, ctx, request),
        fields(
            company_id = %ctx.company_id(),
            source_stock_unit_id = %request.source_stock_unit_id,
            recipients = request.recipients.len()
        ),
        err
    )]
    pub async fn create_transfer(
        &self,
        ctx: &EngineContext,
        request: TransferRequest,
    ) -> Result<Transfer, EngineError> {
        request.validate()?;
        let company_id = ctx.company_id();
        let source_id = request.source_stock_unit_id;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let source_before = tx
            .stock_unit_for_update(company_id, source_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("stock unit {source_id}")))?;
        if !source_before.is_active() {
            return Err(EngineError::invalid(format!(
                "stock unit {source_id} is inactive and cannot be transferred"
            )));
        }

        // Shortfalls are reported against the whole request, not the recipient
        // that happened to cross the line.
        source_before.ensure_can_supply(request.total_requested()?)?;

        let mut source = source_before.clone();
        for recipient in &request.recipients {
            source = self
                .ledger
                .reserve(tx.as_mut(), company_id, source_id, recipient.quantity(), now)
                .await?;
        }

        let transfer_id = TransferId::new();
        let mut recipients = Vec::with_capacity(request.recipients.len());
        // Received units belong to the source's financial year, whatever year
        // the transfer itself is booked in.
        let receipt_year = source_before.financial_year().clone();
        for recipient in &request.recipients {
            let challan_no = issue_number_in(
                &self.sequences,
                company_id,
                &receipt_year,
                DocumentType::Challan,
                self.number_width,
            )
            .await?;
            let unit = StockUnit::received_via_transfer(NewTransferReceipt {
                id: StockUnitId::new(),
                company_id,
                financial_year: receipt_year.clone(),
                challan_no,
                party_id: recipient.party_id,
                quantity: recipient.quantity(),
                source_stock_unit_id: source_id,
                source_transfer_id: transfer_id,
                received_at: now,
            })?;
            tx.insert_stock_unit(&unit).await?;
            recipients.push(TransferRecipient {
                party_id: recipient.party_id,
                boxes: recipient.boxes,
                meters: recipient.meters,
                created_stock_unit_id: unit.id_typed(),
                challan_no: unit.challan_no().to_string(),
            });
        }

        let transfer_no = self.number(ctx, DocumentType::Transfer).await?;
        let transfer = Transfer::create(NewTransfer {
            id: transfer_id,
            company_id,
            financial_year: ctx.financial_year().clone(),
            transfer_no,
            source_stock_unit_id: source_id,
            source_party_id: source.party_id(),
            recipients,
            reason: request.reason,
            notes: request.notes,
            created_by: ctx.actor_id(),
            created_at: now,
        })?;
        tx.insert_transfer(&transfer).await?;
        tx.commit().await?;

        info!(
            transfer_id = %transfer.id_typed(),
            transfer_no = transfer.transfer_no(),
            "transfer completed"
        );
        let event = InventoryEvent::TransferCompleted(TransferCompleted {
            company_id,
            transfer_id: transfer.id_typed(),
            transfer_no: transfer.transfer_no().to_string(),
            source_stock_unit_id: source_id,
            recipient_stock_unit_ids: transfer
                .recipients()
                .iter()
                .map(|r| r.created_stock_unit_id)
                .collect(),
            total: transfer.total(),
            occurred_at: now,
        });
        let record = AuditRecord::from_event(
            company_id,
            ctx.actor_id(),
            "transfer",
            transfer.id_typed().into(),
            &event,
        )
        .with_before(&source_before)
        .with_after(&transfer);
        emit_best_effort(&self.audit, record);

        Ok(transfer)
    }

    /// Undo a completed transfer whose recipient units are still untouched.
    ///
    /// Recipient units are deactivated, not deleted, so lineage stays whole.
    #[instrument(
        skip(self, ctx),
        fields(company_id = %ctx.company_id(), transfer_id = %transfer_id),
        err
    )]
    pub async fn reverse_transfer(
        &self,
        ctx: &EngineContext,
        transfer_id: TransferId,
    ) -> Result<Transfer, EngineError> {
        let company_id = ctx.company_id();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let mut transfer = tx
            .transfer_for_update(company_id, transfer_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("transfer {transfer_id}")))?;
        transfer.ensure_not_reversed()?;
        let transfer_before = transfer.clone();

        let mut recipient_ids: Vec<StockUnitId> = transfer
            .recipients()
            .iter()
            .map(|r| r.created_stock_unit_id)
            .collect();
        recipient_ids.sort();

        let mut recipients = Vec::with_capacity(recipient_ids.len());
        for unit_id in recipient_ids {
            let unit = tx
                .stock_unit_for_update(company_id, unit_id)
                .await?
                .ok_or_else(|| {
                    EngineError::invariant(format!(
                        "recipient stock unit {unit_id} of transfer {transfer_id} is missing"
                    ))
                })?;
            if tx.has_completed_transfers_from(company_id, unit_id).await? {
                return Err(EngineError::TransferNotReversible(format!(
                    "recipient stock unit {} has been transferred onward",
                    unit.challan_no()
                )));
            }
            if tx.has_invoice_usage(company_id, unit_id).await? {
                return Err(EngineError::TransferNotReversible(format!(
                    "recipient stock unit {} has been used on an invoice",
                    unit.challan_no()
                )));
            }
            recipients.push(unit);
        }

        let restored = transfer.total();
        self.ledger
            .restore(
                tx.as_mut(),
                company_id,
                transfer.source_stock_unit_id(),
                restored,
                now,
            )
            .await?;

        for unit in &mut recipients {
            unit.deactivate_for_reversal(now)?;
            tx.update_stock_unit(unit).await?;
        }

        transfer.reverse(ctx.actor_id(), now)?;
        tx.update_transfer(&transfer).await?;
        tx.commit().await?;

        info!(transfer_no = transfer.transfer_no(), "transfer reversed");
        let event = InventoryEvent::TransferReversed(TransferReversed {
            company_id,
            transfer_id,
            source_stock_unit_id: transfer.source_stock_unit_id(),
            restored,
            deactivated_stock_unit_ids: recipients.iter().map(|u| u.id_typed()).collect(),
            occurred_at: now,
        });
        let record = AuditRecord::from_event(
            company_id,
            ctx.actor_id(),
            "transfer",
            transfer_id.into(),
            &event,
        )
        .with_before(&transfer_before)
        .with_after(&transfer);
        emit_best_effort(&self.audit, record);

        Ok(transfer)
    }

    /// Note that an invoice consumed a stock unit; its producing transfer can
    /// no longer be reversed. Recording the same pair twice is a no-op.
    #[instrument(
        skip(self, ctx),
        fields(company_id = %ctx.company_id(), stock_unit_id = %stock_unit_id, invoice_id = %invoice_id),
        err
    )]
    pub async fn record_invoice_usage(
        &self,
        ctx: &EngineContext,
        stock_unit_id: StockUnitId,
        invoice_id: DocumentId,
    ) -> Result<(), EngineError> {
        let company_id = ctx.company_id();
        let mut tx = self.store.begin().await?;
        let unit = tx
            .stock_unit_for_update(company_id, stock_unit_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("stock unit {stock_unit_id}")))?;
        if !unit.is_active() {
            return Err(EngineError::invalid(format!(
                "stock unit {} is inactive and cannot be invoiced",
                unit.challan_no()
            )));
        }
        tx.insert_invoice_usage(company_id, stock_unit_id, invoice_id)
            .await?;
        tx.commit().await?;
        info!(challan_no = unit.challan_no(), "invoice usage recorded");
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(company_id = %ctx.company_id(), transfer_id = %transfer_id), err)]
    pub async fn transfer(
        &self,
        ctx: &EngineContext,
        transfer_id: TransferId,
    ) -> Result<Transfer, EngineError> {
        self.store
            .transfer(ctx.company_id(), transfer_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("transfer {transfer_id}")))
    }

    /// Completed and reversed transfers alike, newest first.
    #[instrument(skip(self, ctx), fields(company_id = %ctx.company_id()), err)]
    pub async fn transfers(&self, ctx: &EngineContext) -> Result<Vec<Transfer>, EngineError> {
        Ok(self.store.transfers(ctx.company_id()).await?)
    }

    /// Active units with stock left, newest first.
    #[instrument(skip(self, ctx), fields(company_id = %ctx.company_id()), err)]
    pub async fn available_inventory(
        &self,
        ctx: &EngineContext,
    ) -> Result<Vec<StockUnit>, EngineError> {
        Ok(self.store.available_stock_units(ctx.company_id()).await?)
    }

    /// Ancestors up to the originating purchase and every descendant.
    #[instrument(
        skip(self, ctx),
        fields(company_id = %ctx.company_id(), stock_unit_id = %stock_unit_id),
        err
    )]
    pub async fn lineage(
        &self,
        ctx: &EngineContext,
        stock_unit_id: StockUnitId,
    ) -> Result<Lineage, EngineError> {
        let company_id = ctx.company_id();
        let focus = self
            .store
            .stock_unit(company_id, stock_unit_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("stock unit {stock_unit_id}")))?;
        let mut lineage = Lineage::new(&focus);

        let mut child = lineage.focus();
        let mut via = focus.source_transfer_id();
        while let Some(transfer_id) = via {
            let transfer = self
                .store
                .transfer(company_id, transfer_id)
                .await?
                .ok_or_else(|| {
                    EngineError::invariant(format!("producing transfer {transfer_id} is missing"))
                })?;
            let parent_id = transfer.source_stock_unit_id();
            let parent = self
                .store
                .stock_unit(company_id, parent_id)
                .await?
                .ok_or_else(|| {
                    EngineError::invariant(format!("source stock unit {parent_id} is missing"))
                })?;
            child = lineage.attach_parent(child, &parent, &transfer)?;
            via = parent.source_transfer_id();
        }

        let mut queue = VecDeque::from([(lineage.focus(), stock_unit_id)]);
        while let Some((parent, parent_id)) = queue.pop_front() {
            for transfer in self.store.transfers_from(company_id, parent_id).await? {
                for recipient in transfer.recipients() {
                    let child_id = recipient.created_stock_unit_id;
                    let unit = self
                        .store
                        .stock_unit(company_id, child_id)
                        .await?
                        .ok_or_else(|| {
                            EngineError::invariant(format!(
                                "recipient stock unit {child_id} is missing"
                            ))
                        })?;
                    let index = lineage.attach_child(parent, &unit, &transfer)?;
                    queue.push_back((index, child_id));
                }
            }
        }

        Ok(lineage)
    }

    async fn number(
        &self,
        ctx: &EngineContext,
        document_type: DocumentType,
    ) -> Result<String, EngineError> {
        issue_number(&self.sequences, ctx, document_type, self.number_width).await
    }
}
