use axum::Router;

pub mod settlement;
pub mod stock_units;
pub mod system;
pub mod transfers;

/// Router for all company-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/stock-units", stock_units::router())
        .nest("/transfers", transfers::router())
        .merge(settlement::router())
}
