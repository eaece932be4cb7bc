use std::sync::Arc;

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use tradeledger_api::app::{AppServices, build_app};
use tradeledger_infra::EngineConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory services, bound to an ephemeral port.
        let services = AppServices::in_memory(&EngineConfig::default());
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Client that sends the context headers of one company and actor.
struct Caller {
    client: reqwest::Client,
    base_url: String,
    company_id: String,
    actor_id: String,
}

impl Caller {
    fn new(srv: &TestServer) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: srv.base_url.clone(),
            company_id: Uuid::now_v7().to_string(),
            actor_id: Uuid::now_v7().to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-company-id", &self.company_id)
            .header("x-financial-year", "2025")
            .header("x-actor-id", &self.actor_id)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .unwrap();
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn purchase(&self, boxes: i64, meters: &str) -> Value {
        let (status, body) = self
            .post(
                "/stock-units",
                json!({ "party_id": Uuid::now_v7(), "boxes": boxes, "meters": meters }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

fn recipient(boxes: i64) -> Value {
    json!({ "party_id": Uuid::now_v7(), "boxes": boxes, "meters": "0" })
}

#[tokio::test]
async fn health_needs_no_context() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_context_headers_are_rejected() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .get(format!("{}/stock-units/available", srv.base_url))
        .header("x-financial-year", "2025")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_context");
}

#[tokio::test]
async fn transfer_and_reverse_round_trip() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);

    let source = caller.purchase(100, "25.5").await;
    assert_eq!(source["challan_no"], "CH-2025-0001");
    let source_id = source["id"].as_str().unwrap().to_string();

    let (status, transfer) = caller
        .post(
            "/transfers",
            json!({
                "source_stock_unit_id": source_id,
                "recipients": [recipient(30), recipient(20)],
                "reason": "split for delivery"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{transfer}");
    assert_eq!(transfer["transfer_no"], "TR-2025-0001");
    assert_eq!(transfer["status"], "completed");
    assert_eq!(transfer["recipients"].as_array().unwrap().len(), 2);

    let (status, available) = caller.get("/stock-units/available").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(available.as_array().unwrap().len(), 3);

    let transfer_id = transfer["id"].as_str().unwrap();
    let (status, reversed) = caller
        .post(&format!("/transfers/{transfer_id}/reverse"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{reversed}");
    assert_eq!(reversed["status"], "reversed");

    let (_, available) = caller.get("/stock-units/available").await;
    let units = available.as_array().unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0]["available"]["boxes"], 100);

    let (status, again) = caller
        .post(&format!("/transfers/{transfer_id}/reverse"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"], "already_reversed");

    let (status, lineage) = caller
        .get(&format!("/stock-units/{source_id}/lineage"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lineage["nodes"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn oversubscribed_transfer_reports_shortfall() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let source = caller.purchase(100, "0").await;

    let (status, body) = caller
        .post(
            "/transfers",
            json!({
                "source_stock_unit_id": source["id"],
                "recipients": [recipient(60), recipient(50)]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_inventory");
    assert_eq!(body["message"], "only 100 boxes available, 110 requested");
    assert_eq!(body["details"]["unit"], "boxes");
    assert_eq!(body["retryable"], false);

    let (_, available) = caller.get("/stock-units/available").await;
    assert_eq!(available[0]["available"]["boxes"], 100);
}

#[tokio::test]
async fn transfers_are_listed_newest_first_and_fetchable() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let source = caller.purchase(50, "0").await;

    let mut ids = Vec::new();
    for boxes in [5, 7] {
        let (status, transfer) = caller
            .post(
                "/transfers",
                json!({ "source_stock_unit_id": source["id"], "recipients": [recipient(boxes)] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{transfer}");
        ids.push(transfer["id"].as_str().unwrap().to_string());
    }
    caller
        .post(&format!("/transfers/{}/reverse", ids[0]), json!({}))
        .await;

    let (status, listed) = caller.get("/transfers").await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["id"], ids[1]);
    assert_eq!(listed[1]["id"], ids[0]);
    assert_eq!(listed[1]["status"], "reversed");

    let (status, fetched) = caller.get(&format!("/transfers/{}", ids[1])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["transfer_no"], "TR-2025-0002");

    let stranger = Caller::new(&srv);
    let (status, _) = stranger.get(&format!("/transfers/{}", ids[1])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, listed) = stranger.get("/transfers").await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invoiced_unit_blocks_reversal() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let source = caller.purchase(10, "0").await;

    let (_, transfer) = caller
        .post(
            "/transfers",
            json!({ "source_stock_unit_id": source["id"], "recipients": [recipient(4)] }),
        )
        .await;
    let received = transfer["recipients"][0]["created_stock_unit_id"]
        .as_str()
        .unwrap();

    let res = caller
        .request(
            reqwest::Method::POST,
            &format!("/stock-units/{received}/invoice-usages"),
        )
        .json(&json!({ "invoice_id": Uuid::now_v7() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, body) = caller
        .post(
            &format!("/transfers/{}/reverse", transfer["id"].as_str().unwrap()),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "transfer_not_reversible");
}

#[tokio::test]
async fn payments_settle_registered_documents() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let party = Uuid::now_v7();
    let invoice = json!({ "id": Uuid::now_v7(), "target_type": "invoice" });

    let (status, body) = caller
        .post(
            "/settlement-targets",
            json!({
                "document": invoice,
                "party_id": party,
                "gross_amount": "500",
                "due_date": "2025-01-01",
                "annual_interest_rate": "0.365"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let payment_id = Uuid::now_v7();
    let (status, payment) = caller
        .post(
            "/payments",
            json!({
                "payment_id": payment_id,
                "kind": "receipt",
                "party_id": party,
                "payment_date": "2025-01-05",
                "allocations": [{ "target": invoice, "amount": "200" }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{payment}");
    assert_eq!(payment["payment_no"], "REC-2025-0001");

    let (status, fetched) = caller.get(&format!("/payments/{payment_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["payment_no"], "REC-2025-0001");

    let (status, body) = caller
        .post(
            "/payments",
            json!({
                "payment_id": Uuid::now_v7(),
                "kind": "receipt",
                "party_id": party,
                "payment_date": "2025-01-06",
                "allocations": [{ "target": invoice, "amount": "300.01" }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "over_allocation");

    let (status, enriched) = caller
        .post(
            "/settlement/enrich",
            json!({
                "as_of": "2025-01-11",
                "documents": [{
                    "document": invoice,
                    "gross_amount": "500",
                    "due_date": "2025-01-01",
                    "annual_interest_rate": "0.365"
                }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{enriched}");
    assert_eq!(enriched[0]["status"], "partial");
    assert_eq!(decimal(&enriched[0]["paid_amount"]), Decimal::from(200));
    assert_eq!(decimal(&enriched[0]["outstanding_amount"]), Decimal::from(300));
    // 300 * 0.365 * 10 / 365
    assert_eq!(decimal(&enriched[0]["interest"]), Decimal::from(3));
}

#[tokio::test]
async fn enrichment_rejects_negative_gross() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);

    let (status, body) = caller
        .post(
            "/settlement/enrich",
            json!({
                "as_of": "2025-01-11",
                "documents": [{
                    "document": { "id": Uuid::now_v7(), "target_type": "challan" },
                    "gross_amount": "-500"
                }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn companies_are_isolated() {
    let srv = TestServer::spawn().await;
    let owner = Caller::new(&srv);
    let stranger = Caller::new(&srv);
    let source = owner.purchase(5, "0").await;

    let (status, body) = stranger
        .get(&format!(
            "/stock-units/{}/lineage",
            source["id"].as_str().unwrap()
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    let (_, available) = stranger.get("/stock-units/available").await;
    assert!(available.as_array().unwrap().is_empty());
}
