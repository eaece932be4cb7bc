use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use tradeledger_core::{EngineContext, PaymentId};
use tradeledger_settlement::{PaymentRequest, TargetRegistration};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/settlement-targets", post(register_target))
        .route("/settlement/enrich", post(enrich))
        .route("/payments", post(allocate_payment))
        .route("/payments/:id", get(get_payment))
}

pub async fn register_target(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Json(body): Json<TargetRegistration>,
) -> axum::response::Response {
    match services.settlement.register_target(&ctx, body).await {
        Ok(target) => Json(target).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn allocate_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Json(body): Json<PaymentRequest>,
) -> axum::response::Response {
    match services.settlement.allocate_payment(&ctx, body).await {
        Ok(payment) => (StatusCode::CREATED, Json(payment)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: PaymentId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.settlement.payment(&ctx, id).await {
        Ok(payment) => Json(payment).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn enrich(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<EngineContext>,
    Json(body): Json<dto::EnrichRequest>,
) -> axum::response::Response {
    let as_of = body.as_of.unwrap_or_else(|| Utc::now().date_naive());
    match services
        .settlement
        .enrich_with_payments(&ctx, body.documents, as_of)
        .await
    {
        Ok(documents) => Json(documents).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
