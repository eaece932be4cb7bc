use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

use super::{SequenceGenerator, SequenceScope};

/// Postgres-backed sequence generator.
///
/// A single `INSERT ... ON CONFLICT DO UPDATE ... RETURNING` both creates the
/// counter on first use and increments it; the row lock it takes is held only
/// for that statement. It runs on its own pooled connection, outside any ledger
/// transaction, so a rolled-back document leaves a gap rather than a reuse.
#[derive(Debug, Clone)]
pub struct PostgresSequenceGenerator {
    pool: Arc<PgPool>,
}

impl PostgresSequenceGenerator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl SequenceGenerator for PostgresSequenceGenerator {
    #[instrument(
        skip(self),
        fields(
            company_id = %scope.company_id,
            financial_year = %scope.financial_year,
            document_type = scope.document_type.prefix()
        ),
        err
    )]
    async fn next(&self, scope: &SequenceScope) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_counters (company_id, financial_year, document_type, last_value)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (company_id, financial_year, document_type)
            DO UPDATE SET last_value = sequence_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(scope.company_id.as_uuid())
        .bind(scope.financial_year.as_str())
        .bind(scope.document_type.prefix())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("next_sequence_value", e))?;

        let value: i64 = row
            .try_get("last_value")
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        u64::try_from(value)
            .map_err(|_| StoreError::Serialization(format!("negative sequence value {value}")))
    }
}
