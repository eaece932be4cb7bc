//! Postgres-backed ledger store.
//!
//! Every mutation runs inside one database transaction. Rows that are checked
//! and then written (a stock unit being reserved, a transfer being reversed, a
//! settlement target receiving a payment) are read with `SELECT ... FOR UPDATE`,
//! so a second transaction touching the same row waits until the first commits
//! or aborts and then sees its result.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database | `40001` | `TransactionFailed` | Serialization failure |
//! | Database | `40P01` | `TransactionFailed` | Deadlock detected |
//! | Database | `55P03` | `TransactionFailed` | `lock_timeout` elapsed |
//! | Database | `57014` | `TransactionFailed` | `statement_timeout` elapsed |
//! | Database | `23505` | `Conflict` | Unique violation (concurrent duplicate) |
//! | Database | Any other | `Backend` | Other database errors |
//! | PoolTimedOut | N/A | `TransactionFailed` | No connection available in time |
//! | ColumnDecode / Decode | N/A | `Serialization` | Row could not be decoded |
//! | Other | N/A | `Backend` | Network errors, closed pool, etc. |

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use tradeledger_core::{
    CompanyId, DocumentId, Entity, FinancialYear, PartyId, PaymentId, Quantity, StockUnitId,
    TransferId, UserId,
};
use tradeledger_inventory::{StockUnit, StockUnitStatus, Transfer, TransferRecipient, TransferStatus};
use tradeledger_settlement::{
    DocumentRef, NewPayment, Payment, PaymentKind, SettlementAllocation, SettlementTarget,
    TargetType,
};

use super::r#trait::{LedgerStore, LedgerTransaction, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_ledger_engine.sql");

const STOCK_UNIT_COLUMNS: &str = "id, company_id, financial_year, challan_no, party_id, \
     total_boxes, total_meters, available_boxes, available_meters, \
     transferred_boxes, transferred_meters, is_transfer_source, is_received_via_transfer, \
     source_stock_unit_id, source_transfer_id, status, created_at, updated_at";

const TRANSFER_COLUMNS: &str = "id, company_id, financial_year, transfer_no, \
     source_stock_unit_id, source_party_id, recipients, reason, notes, status, \
     created_by, created_at, reversed_by, reversed_at";

const TARGET_COLUMNS: &str =
    "company_id, document_id, target_type, party_id, gross_amount, due_date, annual_interest_rate";

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
    transaction_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, transaction_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            transaction_timeout,
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        transaction_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(transaction_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, transaction_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the ledger tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }
}

pub struct PostgresLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl LedgerTransaction for PostgresLedgerTransaction {
    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn stock_unit_for_update(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Option<StockUnit>, StoreError> {
        let sql = format!(
            "SELECT {STOCK_UNIT_COLUMNS} FROM stock_units \
             WHERE company_id = $1 AND id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("stock_unit_for_update", e))?;
        row.as_ref().map(stock_unit_from_row).transpose()
    }

    async fn insert_stock_unit(&mut self, unit: &StockUnit) -> Result<(), StoreError> {
        let total = unit.total();
        let available = unit.available();
        let transferred = unit.transferred();
        sqlx::query(
            r#"
            INSERT INTO stock_units (
                id, company_id, financial_year, challan_no, party_id,
                total_boxes, total_meters, available_boxes, available_meters,
                transferred_boxes, transferred_meters, is_transfer_source,
                is_received_via_transfer, source_stock_unit_id, source_transfer_id,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(unit.id_typed().as_uuid())
        .bind(unit.company_id().as_uuid())
        .bind(unit.financial_year().as_str())
        .bind(unit.challan_no())
        .bind(unit.party_id().as_uuid())
        .bind(total.boxes)
        .bind(total.meters)
        .bind(available.boxes)
        .bind(available.meters)
        .bind(transferred.boxes)
        .bind(transferred.meters)
        .bind(unit.is_transfer_source())
        .bind(unit.is_received_via_transfer())
        .bind(unit.source_stock_unit_id().map(Uuid::from))
        .bind(unit.source_transfer_id().map(Uuid::from))
        .bind(unit.status().as_str())
        .bind(unit.created_at())
        .bind(unit.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_stock_unit", e))?;
        Ok(())
    }

    async fn update_stock_unit(&mut self, unit: &StockUnit) -> Result<(), StoreError> {
        let available = unit.available();
        let transferred = unit.transferred();
        let result = sqlx::query(
            r#"
            UPDATE stock_units
            SET available_boxes = $3,
                available_meters = $4,
                transferred_boxes = $5,
                transferred_meters = $6,
                is_transfer_source = $7,
                status = $8,
                updated_at = $9
            WHERE company_id = $1 AND id = $2
            "#,
        )
        .bind(unit.company_id().as_uuid())
        .bind(unit.id_typed().as_uuid())
        .bind(available.boxes)
        .bind(available.meters)
        .bind(transferred.boxes)
        .bind(transferred.meters)
        .bind(unit.is_transfer_source())
        .bind(unit.status().as_str())
        .bind(unit.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock_unit", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("stock unit {}", unit.id_typed())));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn transfer_for_update(
        &mut self,
        company_id: CompanyId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE company_id = $1 AND id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("transfer_for_update", e))?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn insert_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        let recipients = serde_json::to_value(transfer.recipients())
            .map_err(|e| StoreError::Serialization(format!("transfer recipients: {e}")))?;
        let total = transfer.total();
        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, company_id, financial_year, transfer_no, source_stock_unit_id,
                source_party_id, recipients, total_boxes, total_meters, reason, notes,
                status, created_by, created_at, reversed_by, reversed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(transfer.id_typed().as_uuid())
        .bind(transfer.company_id().as_uuid())
        .bind(transfer.financial_year().as_str())
        .bind(transfer.transfer_no())
        .bind(transfer.source_stock_unit_id().as_uuid())
        .bind(transfer.source_party_id().as_uuid())
        .bind(recipients)
        .bind(total.boxes)
        .bind(total.meters)
        .bind(transfer.reason())
        .bind(transfer.notes())
        .bind(transfer.status().as_str())
        .bind(transfer.created_by().as_uuid())
        .bind(transfer.created_at())
        .bind(transfer.reversed_by().map(Uuid::from))
        .bind(transfer.reversed_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_transfer", e))?;
        Ok(())
    }

    async fn update_transfer(&mut self, transfer: &Transfer) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = $3, reversed_by = $4, reversed_at = $5
            WHERE company_id = $1 AND id = $2
            "#,
        )
        .bind(transfer.company_id().as_uuid())
        .bind(transfer.id_typed().as_uuid())
        .bind(transfer.status().as_str())
        .bind(transfer.reversed_by().map(Uuid::from))
        .bind(transfer.reversed_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_transfer", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("transfer {}", transfer.id_typed())));
        }
        Ok(())
    }

    async fn has_completed_transfers_from(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM transfers
                WHERE company_id = $1 AND source_stock_unit_id = $2 AND status = 'completed'
            ) AS present
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("has_completed_transfers_from", e))?;
        row.try_get("present").map_err(decode_error)
    }

    async fn has_invoice_usage(
        &mut self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM stock_unit_usages WHERE company_id = $1 AND stock_unit_id = $2
            ) AS present
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("has_invoice_usage", e))?;
        row.try_get("present").map_err(decode_error)
    }

    async fn insert_invoice_usage(
        &mut self,
        company_id: CompanyId,
        stock_unit_id: StockUnitId,
        invoice_id: DocumentId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_unit_usages (company_id, stock_unit_id, invoice_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(stock_unit_id.as_uuid())
        .bind(invoice_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_invoice_usage", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id, document = %document), err)]
    async fn settlement_target_for_update(
        &mut self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Option<SettlementTarget>, StoreError> {
        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM settlement_targets \
             WHERE company_id = $1 AND document_id = $2 AND target_type = $3 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(document.id.as_uuid())
            .bind(document.target_type.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("settlement_target_for_update", e))?;
        row.as_ref().map(target_from_row).transpose()
    }

    async fn upsert_settlement_target(
        &mut self,
        target: &SettlementTarget,
    ) -> Result<(), StoreError> {
        let document = target.document();
        sqlx::query(
            r#"
            INSERT INTO settlement_targets (
                company_id, document_id, target_type, party_id,
                gross_amount, due_date, annual_interest_rate, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (company_id, document_id, target_type) DO UPDATE
            SET party_id = EXCLUDED.party_id,
                gross_amount = EXCLUDED.gross_amount,
                due_date = EXCLUDED.due_date,
                annual_interest_rate = EXCLUDED.annual_interest_rate,
                updated_at = now()
            "#,
        )
        .bind(target.company_id().as_uuid())
        .bind(document.id.as_uuid())
        .bind(document.target_type.as_str())
        .bind(target.party_id().as_uuid())
        .bind(target.gross_amount())
        .bind(target.due_date())
        .bind(target.annual_interest_rate())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_settlement_target", e))?;
        Ok(())
    }

    async fn applied_total(
        &mut self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Decimal, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount_applied), 0) AS applied
            FROM settlement_allocations
            WHERE company_id = $1 AND document_id = $2 AND target_type = $3
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(document.id.as_uuid())
        .bind(document.target_type.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("applied_total", e))?;
        row.try_get("applied").map_err(decode_error)
    }

    async fn payment_exists(
        &mut self,
        company_id: CompanyId,
        id: PaymentId,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM payments WHERE company_id = $1 AND id = $2) AS present",
        )
        .bind(company_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("payment_exists", e))?;
        row.try_get("present").map_err(decode_error)
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.id_typed()), err)]
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                company_id, id, financial_year, payment_no, kind, party_id,
                amount, payment_date, notes, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(payment.company_id().as_uuid())
        .bind(payment.id_typed().as_uuid())
        .bind(payment.financial_year().as_str())
        .bind(payment.payment_no())
        .bind(payment.kind().as_str())
        .bind(payment.party_id().as_uuid())
        .bind(payment.amount())
        .bind(payment.payment_date())
        .bind(payment.notes())
        .bind(payment.created_by().as_uuid())
        .bind(payment.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_payment", e))?;

        for (position, allocation) in payment.allocations().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO settlement_allocations (
                    company_id, payment_id, position, document_id, target_type, amount_applied
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(payment.company_id().as_uuid())
            .bind(payment.id_typed().as_uuid())
            .bind(position as i32)
            .bind(allocation.target.id.as_uuid())
            .bind(allocation.target.target_type.as_str())
            .bind(allocation.amount_applied)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_allocation", e))?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Bound lock waits and statements so a stuck peer surfaces as a retryable failure.
        let timeout_ms = self.transaction_timeout.as_millis();
        for setting in ["lock_timeout", "statement_timeout"] {
            sqlx::query(&format!("SET LOCAL {setting} = {timeout_ms}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("configure_transaction", e))?;
        }
        Ok(Box::new(PostgresLedgerTransaction { tx }))
    }

    async fn stock_unit(
        &self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Option<StockUnit>, StoreError> {
        let sql = format!("SELECT {STOCK_UNIT_COLUMNS} FROM stock_units WHERE company_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stock_unit", e))?;
        row.as_ref().map(stock_unit_from_row).transpose()
    }

    async fn transfer(
        &self,
        company_id: CompanyId,
        id: TransferId,
    ) -> Result<Option<Transfer>, StoreError> {
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE company_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("transfer", e))?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn transfers_from(
        &self,
        company_id: CompanyId,
        id: StockUnitId,
    ) -> Result<Vec<Transfer>, StoreError> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE company_id = $1 AND source_stock_unit_id = $2 \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("transfers_from", e))?;
        rows.iter().map(transfer_from_row).collect()
    }

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn transfers(&self, company_id: CompanyId) -> Result<Vec<Transfer>, StoreError> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE company_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("transfers", e))?;
        rows.iter().map(transfer_from_row).collect()
    }

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn available_stock_units(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<StockUnit>, StoreError> {
        let sql = format!(
            "SELECT {STOCK_UNIT_COLUMNS} FROM stock_units \
             WHERE company_id = $1 AND status = 'active' \
               AND (available_boxes > 0 OR available_meters > 0) \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("available_stock_units", e))?;
        rows.iter().map(stock_unit_from_row).collect()
    }

    #[instrument(skip(self, documents), fields(company_id = %company_id, documents = documents.len()), err)]
    async fn applied_totals(
        &self,
        company_id: CompanyId,
        documents: &[DocumentRef],
    ) -> Result<HashMap<DocumentRef, Decimal>, StoreError> {
        if documents.is_empty() {
            return Ok(HashMap::new());
        }
        let wanted: HashSet<DocumentRef> = documents.iter().copied().collect();
        let ids: Vec<Uuid> = wanted.iter().map(|d| Uuid::from(d.id)).collect();

        // One grouped read for the whole batch.
        let rows = sqlx::query(
            r#"
            SELECT document_id, target_type, SUM(amount_applied) AS applied
            FROM settlement_allocations
            WHERE company_id = $1 AND document_id = ANY($2)
            GROUP BY document_id, target_type
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("applied_totals", e))?;

        let mut totals = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("document_id").map_err(decode_error)?;
            let target_type: String = row.try_get("target_type").map_err(decode_error)?;
            let applied: Decimal = row.try_get("applied").map_err(decode_error)?;
            let document = DocumentRef {
                id: DocumentId::from_uuid(id),
                target_type: parse_target_type(&target_type)?,
            };
            if wanted.contains(&document) {
                totals.insert(document, applied);
            }
        }
        Ok(totals)
    }

    async fn settlement_target(
        &self,
        company_id: CompanyId,
        document: DocumentRef,
    ) -> Result<Option<SettlementTarget>, StoreError> {
        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM settlement_targets \
             WHERE company_id = $1 AND document_id = $2 AND target_type = $3"
        );
        let row = sqlx::query(&sql)
            .bind(company_id.as_uuid())
            .bind(document.id.as_uuid())
            .bind(document.target_type.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("settlement_target", e))?;
        row.as_ref().map(target_from_row).transpose()
    }

    async fn payment(
        &self,
        company_id: CompanyId,
        id: PaymentId,
    ) -> Result<Option<Payment>, StoreError> {
        let Some(row) = sqlx::query(
            r#"
            SELECT company_id, id, financial_year, payment_no, kind, party_id,
                   payment_date, notes, created_by, created_at
            FROM payments
            WHERE company_id = $1 AND id = $2
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("payment", e))?
        else {
            return Ok(None);
        };
        let header = decode::<PaymentRow>(&row)?;

        let rows = sqlx::query(
            r#"
            SELECT document_id, target_type, amount_applied
            FROM settlement_allocations
            WHERE company_id = $1 AND payment_id = $2
            ORDER BY position ASC
            "#,
        )
        .bind(company_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("payment_allocations", e))?;

        let mut allocations = Vec::with_capacity(rows.len());
        for row in rows {
            let document_id: Uuid = row.try_get("document_id").map_err(decode_error)?;
            let target_type: String = row.try_get("target_type").map_err(decode_error)?;
            allocations.push(SettlementAllocation {
                payment_id: id,
                target: DocumentRef {
                    id: DocumentId::from_uuid(document_id),
                    target_type: parse_target_type(&target_type)?,
                },
                amount_applied: row.try_get("amount_applied").map_err(decode_error)?,
            });
        }
        header.into_payment(allocations).map(Some)
    }
}

/// Map SQLx errors to `StoreError`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected, lock_not_available, query_canceled
                Some("40001" | "40P01" | "55P03" | "57014") => StoreError::TransactionFailed(msg),
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::TransactionFailed(format!(
            "timed out acquiring a connection in {}",
            operation
        )),
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(format!("decode error in {}: {}", operation, err))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Serialization(err.to_string())
}

fn decode<T>(row: &PgRow) -> Result<T, StoreError>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(decode_error)
}

fn stock_unit_from_row(row: &PgRow) -> Result<StockUnit, StoreError> {
    decode::<StockUnitRow>(row)?.try_into()
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer, StoreError> {
    decode::<TransferRow>(row)?.try_into()
}

fn target_from_row(row: &PgRow) -> Result<SettlementTarget, StoreError> {
    decode::<TargetRow>(row)?.try_into()
}

fn parse_target_type(value: &str) -> Result<TargetType, StoreError> {
    TargetType::parse(value)
        .ok_or_else(|| StoreError::Serialization(format!("unknown target type '{value}'")))
}

fn parse_financial_year(value: String) -> Result<FinancialYear, StoreError> {
    FinancialYear::parse(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

// SQLx row types

#[derive(Debug)]
struct StockUnitRow {
    id: Uuid,
    company_id: Uuid,
    financial_year: String,
    challan_no: String,
    party_id: Uuid,
    total_boxes: i64,
    total_meters: Decimal,
    available_boxes: i64,
    available_meters: Decimal,
    transferred_boxes: i64,
    transferred_meters: Decimal,
    is_transfer_source: bool,
    is_received_via_transfer: bool,
    source_stock_unit_id: Option<Uuid>,
    source_transfer_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockUnitRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockUnitRow {
            id: row.try_get("id")?,
            company_id: row.try_get("company_id")?,
            financial_year: row.try_get("financial_year")?,
            challan_no: row.try_get("challan_no")?,
            party_id: row.try_get("party_id")?,
            total_boxes: row.try_get("total_boxes")?,
            total_meters: row.try_get("total_meters")?,
            available_boxes: row.try_get("available_boxes")?,
            available_meters: row.try_get("available_meters")?,
            transferred_boxes: row.try_get("transferred_boxes")?,
            transferred_meters: row.try_get("transferred_meters")?,
            is_transfer_source: row.try_get("is_transfer_source")?,
            is_received_via_transfer: row.try_get("is_received_via_transfer")?,
            source_stock_unit_id: row.try_get("source_stock_unit_id")?,
            source_transfer_id: row.try_get("source_transfer_id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<StockUnitRow> for StockUnit {
    type Error = StoreError;

    fn try_from(row: StockUnitRow) -> Result<Self, Self::Error> {
        let status = StockUnitStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Serialization(format!("unknown stock unit status '{}'", row.status))
        })?;
        StockUnit::restore_from_storage(
            StockUnitId::from_uuid(row.id),
            CompanyId::from_uuid(row.company_id),
            parse_financial_year(row.financial_year)?,
            row.challan_no,
            PartyId::from_uuid(row.party_id),
            Quantity::new(row.total_boxes, row.total_meters),
            Quantity::new(row.available_boxes, row.available_meters),
            Quantity::new(row.transferred_boxes, row.transferred_meters),
            row.is_transfer_source,
            row.is_received_via_transfer,
            row.source_stock_unit_id.map(StockUnitId::from_uuid),
            row.source_transfer_id.map(TransferId::from_uuid),
            status,
            row.created_at,
            row.updated_at,
        )
        .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[derive(Debug)]
struct TransferRow {
    id: Uuid,
    company_id: Uuid,
    financial_year: String,
    transfer_no: String,
    source_stock_unit_id: Uuid,
    source_party_id: Uuid,
    recipients: serde_json::Value,
    reason: Option<String>,
    notes: Option<String>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    reversed_by: Option<Uuid>,
    reversed_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for TransferRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransferRow {
            id: row.try_get("id")?,
            company_id: row.try_get("company_id")?,
            financial_year: row.try_get("financial_year")?,
            transfer_no: row.try_get("transfer_no")?,
            source_stock_unit_id: row.try_get("source_stock_unit_id")?,
            source_party_id: row.try_get("source_party_id")?,
            recipients: row.try_get("recipients")?,
            reason: row.try_get("reason")?,
            notes: row.try_get("notes")?,
            status: row.try_get("status")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            reversed_by: row.try_get("reversed_by")?,
            reversed_at: row.try_get("reversed_at")?,
        })
    }
}

impl TryFrom<TransferRow> for Transfer {
    type Error = StoreError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let status = TransferStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Serialization(format!("unknown transfer status '{}'", row.status))
        })?;
        let recipients: Vec<TransferRecipient> = serde_json::from_value(row.recipients)
            .map_err(|e| StoreError::Serialization(format!("transfer recipients: {e}")))?;
        Transfer::restore_from_storage(
            TransferId::from_uuid(row.id),
            CompanyId::from_uuid(row.company_id),
            parse_financial_year(row.financial_year)?,
            row.transfer_no,
            StockUnitId::from_uuid(row.source_stock_unit_id),
            PartyId::from_uuid(row.source_party_id),
            recipients,
            row.reason,
            row.notes,
            status,
            UserId::from_uuid(row.created_by),
            row.created_at,
            row.reversed_by.map(UserId::from_uuid),
            row.reversed_at,
        )
        .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[derive(Debug)]
struct TargetRow {
    company_id: Uuid,
    document_id: Uuid,
    target_type: String,
    party_id: Uuid,
    gross_amount: Decimal,
    due_date: Option<NaiveDate>,
    annual_interest_rate: Option<Decimal>,
}

impl<'r> FromRow<'r, PgRow> for TargetRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TargetRow {
            company_id: row.try_get("company_id")?,
            document_id: row.try_get("document_id")?,
            target_type: row.try_get("target_type")?,
            party_id: row.try_get("party_id")?,
            gross_amount: row.try_get("gross_amount")?,
            due_date: row.try_get("due_date")?,
            annual_interest_rate: row.try_get("annual_interest_rate")?,
        })
    }
}

impl TryFrom<TargetRow> for SettlementTarget {
    type Error = StoreError;

    fn try_from(row: TargetRow) -> Result<Self, Self::Error> {
        SettlementTarget::new(
            DocumentRef {
                id: DocumentId::from_uuid(row.document_id),
                target_type: parse_target_type(&row.target_type)?,
            },
            CompanyId::from_uuid(row.company_id),
            PartyId::from_uuid(row.party_id),
            row.gross_amount,
            row.due_date,
            row.annual_interest_rate,
        )
        .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[derive(Debug)]
struct PaymentRow {
    company_id: Uuid,
    id: Uuid,
    financial_year: String,
    payment_no: String,
    kind: String,
    party_id: Uuid,
    payment_date: NaiveDate,
    notes: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PaymentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PaymentRow {
            company_id: row.try_get("company_id")?,
            id: row.try_get("id")?,
            financial_year: row.try_get("financial_year")?,
            payment_no: row.try_get("payment_no")?,
            kind: row.try_get("kind")?,
            party_id: row.try_get("party_id")?,
            payment_date: row.try_get("payment_date")?,
            notes: row.try_get("notes")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl PaymentRow {
    fn into_payment(self, allocations: Vec<SettlementAllocation>) -> Result<Payment, StoreError> {
        let kind = PaymentKind::parse(&self.kind).ok_or_else(|| {
            StoreError::Serialization(format!("unknown payment kind '{}'", self.kind))
        })?;
        Payment::record(NewPayment {
            id: PaymentId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            financial_year: parse_financial_year(self.financial_year)?,
            payment_no: self.payment_no,
            kind,
            party_id: PartyId::from_uuid(self.party_id),
            payment_date: self.payment_date,
            allocations,
            notes: self.notes,
            created_by: UserId::from_uuid(self.created_by),
            created_at: self.created_at,
        })
        .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
