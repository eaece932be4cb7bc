use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use tradeledger_core::{EngineContext, Quantity, StockUnitId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_purchase))
        .route("/available", get(available_inventory))
        .route("/:id/lineage", get(lineage))
        .route("/:id/invoice-usages", post(record_invoice_usage))
}

pub async fn record_purchase(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Json(body): Json<dto::RecordPurchaseRequest>,
) -> axum::response::Response {
    let quantity = Quantity::new(body.boxes, body.meters);
    match services
        .transfers
        .record_purchase(&ctx, body.party_id, quantity)
        .await
    {
        Ok(unit) => (StatusCode::CREATED, Json(unit)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn available_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
) -> axum::response::Response {
    match services.transfers.available_inventory(&ctx).await {
        Ok(units) => Json(units).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn lineage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: StockUnitId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.transfers.lineage(&ctx, id).await {
        Ok(lineage) => Json(lineage).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn record_invoice_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::InvoiceUsageRequest>,
) -> axum::response::Response {
    let id: StockUnitId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services
        .transfers
        .record_invoice_usage(&ctx, id, body.invoice_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
