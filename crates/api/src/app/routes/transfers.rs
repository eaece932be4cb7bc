use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use tradeledger_core::{EngineContext, TransferId};
use tradeledger_inventory::TransferRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transfers).post(create_transfer))
        .route("/:id", get(get_transfer))
        .route("/:id/reverse", post(reverse_transfer))
}

pub async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
) -> axum::response::Response {
    match services.transfers.transfers(&ctx).await {
        Ok(transfers) => Json(transfers).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TransferId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.transfers.transfer(&ctx, id).await {
        Ok(transfer) => Json(transfer).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn create_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Json(body): Json<TransferRequest>,
) -> axum::response::Response {
    match services.transfers.create_transfer(&ctx, body).await {
        Ok(transfer) => (StatusCode::CREATED, Json(transfer)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn reverse_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TransferId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.transfers.reverse_transfer(&ctx, id).await {
        Ok(transfer) => Json(transfer).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
