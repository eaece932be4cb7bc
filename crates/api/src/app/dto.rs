use std::str::FromStr;

use axum::http::StatusCode;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use tradeledger_core::{DocumentId, PartyId};
use tradeledger_settlement::SettlementDocument;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RecordPurchaseRequest {
    pub party_id: PartyId,
    #[serde(default)]
    pub boxes: i64,
    #[serde(default)]
    pub meters: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceUsageRequest {
    pub invoice_id: DocumentId,
}

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    /// Defaults to today (UTC).
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    pub documents: Vec<SettlementDocument>,
}

// -------------------------
// Helpers
// -------------------------

pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
