use std::str::FromStr;

use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use tradeledger_core::{CompanyId, EngineContext, FinancialYear, UserId};

use crate::app::errors::json_error;
use crate::context::{ACTOR_HEADER, COMPANY_HEADER, FINANCIAL_YEAR_HEADER};

/// Build the engine context from request headers and attach it as an extension.
///
/// Authentication happens upstream; this layer only rejects requests that do
/// not name a company, financial year and actor.
pub async fn context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let ctx = extract_context(req.headers())?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

fn extract_context(headers: &HeaderMap) -> Result<EngineContext, Response> {
    let company_id = parse_header::<CompanyId>(headers, COMPANY_HEADER)?;
    let actor_id = parse_header::<UserId>(headers, ACTOR_HEADER)?;
    let financial_year = FinancialYear::parse(header(headers, FINANCIAL_YEAR_HEADER)?)
        .map_err(|e| bad_context(format!("{FINANCIAL_YEAR_HEADER}: {e}")))?;
    Ok(EngineContext::new(company_id, financial_year, actor_id))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Response> {
    let value = headers
        .get(name)
        .ok_or_else(|| bad_context(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| bad_context(format!("{name} header is not valid text")))?
        .trim();
    if value.is_empty() {
        return Err(bad_context(format!("{name} header is empty")));
    }
    Ok(value)
}

fn parse_header<T>(headers: &HeaderMap, name: &str) -> Result<T, Response>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    header(headers, name)?
        .parse::<T>()
        .map_err(|e| bad_context(format!("{name}: {e}")))
}

fn bad_context(message: String) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_context", message)
}
