//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fulfillment::InMemoryCarrier;
use metrics_exporter_prometheus::PrometheusHandle;
use store::InMemoryOrderStore;
use tower::ServiceExt;
use uuid::Uuid;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, InMemoryCarrier) {
    let store = InMemoryOrderStore::new();
    let (state, _gateway, carrier) = api::create_default_state(store);
    let app = api::create_app(state, get_metrics_handle());
    (app, carrier)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn seed_stock(app: &axum::Router, product_id: Uuid, on_hand: u32) {
    let (status, _) = send(
        app,
        json_request(
            "PUT",
            &format!("/stock/{product_id}"),
            serde_json::json!({"on_hand": on_hand}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

fn order_body(widget: Uuid, gadget: Uuid) -> serde_json::Value {
    serde_json::json!({
        "customer_id": Uuid::new_v4(),
        "payment_method": "card",
        "subtotal_cents": 5500,
        "tax_cents": 350,
        "shipping_cents": 500,
        "total_cents": 6350,
        "items": [
            {"product_id": widget, "quantity": 3, "unit_price_cents": 1000},
            {"product_id": gadget, "quantity": 1, "unit_price_cents": 2500}
        ]
    })
}

async fn create_order(app: &axum::Router) -> (String, serde_json::Value) {
    let widget = Uuid::new_v4();
    let gadget = Uuid::new_v4();
    seed_stock(app, widget, 50).await;
    seed_stock(app, gadget, 50).await;

    let (status, created) = send(
        app,
        json_request("POST", "/orders", order_body(widget, gadget)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = created["order_id"].as_str().unwrap().to_string();
    (order_id, created)
}

#[tokio::test]
async fn health_check() {
    let (app, _) = setup();
    let (status, json) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn create_order_parks_at_approval() {
    let (app, _) = setup();
    let (_, created) = create_order(&app).await;

    assert_eq!(created["workflow_stage"], "approval");
    assert_eq!(created["status"], "draft");
    assert!(
        created["order_number"]
            .as_str()
            .unwrap()
            .starts_with("ORD")
    );
}

#[tokio::test]
async fn create_and_get_order() {
    let (app, _) = setup();
    let (order_id, _) = create_order(&app).await;

    let (status, order) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["id"], order_id.as_str());
    assert_eq!(order["total_cents"], 6350);
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    assert_eq!(order["payment_status"], "pending");
}

#[tokio::test]
async fn invalid_payload_returns_field_errors() {
    let (app, _) = setup();
    let widget = Uuid::new_v4();
    seed_stock(&app, widget, 50).await;

    let body = serde_json::json!({
        "customer_id": Uuid::new_v4(),
        "subtotal_cents": 1000,
        "total_cents": 1000,
        "items": [
            {"product_id": widget, "quantity": 0, "unit_price_cents": 1000}
        ]
    });
    let (status, json) = send(&app, json_request("POST", "/orders", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!json["fields"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn insufficient_stock_conflicts() {
    let (app, _) = setup();
    let widget = Uuid::new_v4();
    let gadget = Uuid::new_v4();
    seed_stock(&app, widget, 1).await;
    seed_stock(&app, gadget, 50).await;

    let (status, _) = send(
        &app,
        json_request("POST", "/orders", order_body(widget, gadget)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_order_is_404_and_bad_id_is_400() {
    let (app, _) = setup();

    let (status, _) = send(&app, get_request(&format!("/orders/{}", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get_request("/orders/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let (app, carrier) = setup();
    let (order_id, _) = create_order(&app).await;

    // approve → picked → packed
    for signal in ["approve", "picked", "packed"] {
        let (status, order) = send(
            &app,
            json_request(
                "POST",
                &format!("/orders/{order_id}/signals/{signal}"),
                serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "signal {signal} failed: {order}");
    }

    let (_, order) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(order["workflow_stage"], "shipping");
    assert_eq!(order["status"], "processing");

    // pay the exact amount
    let (status, receipt) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/payment"),
            serde_json::json!({
                "amount_cents": 6350,
                "payment_method": "card",
                "gateway": "testpay"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        receipt["transaction_number"]
            .as_str()
            .unwrap()
            .starts_with("TXN")
    );

    // issue the label
    let (status, label) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/shipping-label"),
            serde_json::json!({
                "carrier": "fastship",
                "service_type": "standard",
                "shipping_cost_cents": 500,
                "weight": 2.4
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tracking_number = label["tracking_number"].as_str().unwrap().to_string();

    let (_, order) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(order["status"], "shipped");

    // carrier reports delivery
    carrier.set_tracking_status(&tracking_number, domain::ShipmentStatus::Delivered);
    let (status, report) = send(&app, get_request(&format!("/tracking/{tracking_number}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "delivered");
    assert_eq!(report["events"].as_array().unwrap().len(), 5);

    let (_, order) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(order["status"], "delivered");
    assert_eq!(order["workflow_stage"], "completed");

    // the audit trail recorded the whole journey
    let (status, audit) = send(&app, get_request(&format!("/orders/{order_id}/audit"))).await;
    assert_eq!(status, StatusCode::OK);
    let operations: Vec<&str> = audit
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["operation"].as_str().unwrap())
        .collect();
    assert!(operations.contains(&"CREATE"));
    assert!(operations.contains(&"PAYMENT"));
    assert!(operations.contains(&"SHIPMENT"));
    assert!(operations.contains(&"TRACKING"));
}

#[tokio::test]
async fn payment_amount_mismatch_is_unprocessable() {
    let (app, _) = setup();
    let (order_id, _) = create_order(&app).await;

    for signal in ["approve", "picked", "packed"] {
        send(
            &app,
            json_request(
                "POST",
                &format!("/orders/{order_id}/signals/{signal}"),
                serde_json::json!({}),
            ),
        )
        .await;
    }

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/payment"),
            serde_json::json!({
                "amount_cents": 6349,
                "payment_method": "card",
                "gateway": "testpay"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("mismatch"));
}

#[tokio::test]
async fn label_before_payment_conflicts() {
    let (app, _) = setup();
    let (order_id, _) = create_order(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/shipping-label"),
            serde_json::json!({
                "carrier": "fastship",
                "service_type": "standard",
                "shipping_cost_cents": 500,
                "weight": 2.4
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_signal_is_bad_request() {
    let (app, _) = setup();
    let (order_id, _) = create_order(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/signals/launch"),
            serde_json::json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_order_over_http() {
    let (app, _) = setup();
    let (order_id, _) = create_order(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            serde_json::json!({"reason": "changed mind"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, order) = send(&app, get_request(&format!("/orders/{order_id}"))).await;
    assert_eq!(order["status"], "cancelled");
}

#[tokio::test]
async fn stalled_orders_is_empty_for_healthy_flow() {
    let (app, _) = setup();
    create_order(&app).await;

    let (status, stalled) = send(&app, get_request("/orders/stalled")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(stalled.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn actor_header_is_recorded_in_audit() {
    let (app, _) = setup();
    let widget = Uuid::new_v4();
    let gadget = Uuid::new_v4();
    seed_stock(&app, widget, 50).await;
    seed_stock(&app, gadget, 50).await;
    let actor = Uuid::new_v4();

    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-actor-id", actor.to_string())
        .body(Body::from(
            serde_json::to_string(&order_body(widget, gadget)).unwrap(),
        ))
        .unwrap();
    let (status, created) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);

    let order_id = created["order_id"].as_str().unwrap();
    let (_, audit) = send(&app, get_request(&format!("/orders/{order_id}/audit"))).await;
    assert_eq!(audit[0]["operation"], "CREATE");
    assert_eq!(audit[0]["actor"], actor.to_string());
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let (app, _) = setup();
    let response = app
        .clone()
        .oneshot(get_request("/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
