use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tradeledger_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let status = match &err {
        EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InsufficientInventory { .. } | EngineError::OverAllocation { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::AlreadyReversed(_) | EngineError::TransferNotReversible(_) => {
            StatusCode::CONFLICT
        }
        EngineError::TransactionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::InvariantViolation(_) | EngineError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::warn!(code = err.code(), error = %err, "request failed");
    }
    let mut body = json!({
        "error": err.code(),
        "message": err.public_message(),
        "retryable": err.is_retryable(),
    });
    match &err {
        EngineError::InsufficientInventory {
            unit,
            available,
            requested,
        } => {
            body["details"] = json!({
                "unit": unit,
                "available": available,
                "requested": requested,
            });
        }
        EngineError::OverAllocation {
            target,
            gross,
            applied,
            outstanding,
            requested,
        } => {
            body["details"] = json!({
                "target": target,
                "gross": gross,
                "applied": applied,
                "outstanding": outstanding,
                "requested": requested,
            });
        }
        _ => {}
    }
    (status, axum::Json(body)).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
