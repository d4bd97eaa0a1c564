//! Order endpoints: creation, reads, payment, shipping, signals, cancel.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::OrderId;
use domain::{NewOrderRequest, OrderItem, OrderRecord, StageSignal};
use fulfillment::{
    InMemoryCarrier, InMemoryGateway, LabelIssued, OrderCreated, OrderProcessor, PaymentReceipt,
    PaymentRequest, ShippingRequest,
};
use serde::{Deserialize, Serialize};
use store::{InMemoryKeyValueStore, OrderStore};
use uuid::Uuid;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
///
/// The gateway and carrier are the in-memory doubles; wiring real providers
/// in means swapping these two fields.
pub struct AppState<S: OrderStore> {
    pub processor: OrderProcessor<S, InMemoryKeyValueStore, InMemoryGateway, InMemoryCarrier>,
    pub store: S,
}

// -- Request / response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub discount_percent: u32,
    pub tax_rate: u32,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub status: String,
    pub workflow_type: String,
    pub workflow_stage: String,
    pub payment_status: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    fn from_record(order: &OrderRecord, items: &[OrderItem]) -> Self {
        Self {
            id: order.order_id.to_string(),
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.to_string(),
            status: order.status.to_string(),
            workflow_type: order.workflow_kind.to_string(),
            workflow_stage: order.workflow_stage.to_string(),
            payment_status: order.payment_status.to_string(),
            subtotal_cents: order.subtotal.cents(),
            discount_cents: order.discount_amount.cents(),
            tax_cents: order.tax_amount.cents(),
            shipping_cents: order.shipping_amount.cents(),
            total_cents: order.total_amount.cents(),
            currency: order.currency.clone(),
            items: items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                    discount_percent: item.discount_percent,
                    tax_rate: item.tax_rate,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct StalledOrderResponse {
    pub id: String,
    pub order_number: String,
    pub workflow_type: String,
    pub workflow_stage: String,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Handlers --

/// POST /orders — validate and create an order.
pub async fn create<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(request): Json<NewOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreated>), ApiError> {
    let actor = actor_from(&headers)?;
    let created = state.processor.create_order(&request, actor).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /orders/{id} — load an order with its items.
pub async fn get<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.processor.get_order(order_id).await?;
    let items = state.processor.order_items(order_id).await?;
    Ok(Json(OrderResponse::from_record(&order, &items)))
}

/// GET /orders/{id}/audit — the order's audit trail.
pub async fn audit<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<domain::AuditRecord>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.processor.audit_trail(order_id).await?))
}

/// GET /orders/stalled — orders whose auto-advancement never finished.
pub async fn stalled<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<StalledOrderResponse>>, ApiError> {
    let orders = state.processor.stalled_orders().await?;
    Ok(Json(
        orders
            .iter()
            .map(|o| StalledOrderResponse {
                id: o.order_id.to_string(),
                order_number: o.order_number.clone(),
                workflow_type: o.workflow_kind.to_string(),
                workflow_stage: o.workflow_stage.to_string(),
            })
            .collect(),
    ))
}

/// POST /orders/{id}/payment — take the exact-amount payment.
pub async fn payment<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentReceipt>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let actor = actor_from(&headers)?;
    let receipt = state
        .processor
        .process_payment(order_id, &request, actor)
        .await?;
    Ok(Json(receipt))
}

/// POST /orders/{id}/shipping-label — issue a carrier label.
pub async fn shipping_label<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ShippingRequest>,
) -> Result<Json<LabelIssued>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let actor = actor_from(&headers)?;
    let label = state
        .processor
        .create_shipping_label(order_id, &request, actor)
        .await?;
    Ok(Json(label))
}

/// POST /orders/{id}/signals/{signal} — complete a manual stage.
pub async fn signal<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, signal)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let actor = actor_from(&headers)?;
    let signal: StageSignal = signal
        .parse()
        .map_err(|e: domain::InvalidEnumValue| ApiError::BadRequest(e.to_string()))?;

    let order = state.processor.signal(order_id, signal, actor).await?;
    let items = state.processor.order_items(order_id).await?;
    Ok(Json(OrderResponse::from_record(&order, &items)))
}

/// POST /orders/{id}/advance — retry stalled auto-advancement.
pub async fn advance<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let actor = actor_from(&headers)?;
    let order = state.processor.retry_advance(order_id, actor).await?;
    let items = state.processor.order_items(order_id).await?;
    Ok(Json(OrderResponse::from_record(&order, &items)))
}

/// POST /orders/{id}/cancel — cancel a not-yet-shipped order.
pub async fn cancel<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CancelRequest>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_order_id(&id)?;
    let actor = actor_from(&headers)?;
    let reason = request.reason.as_deref().unwrap_or("cancelled by caller");
    state.processor.cancel_order(order_id, reason, actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

/// The acting user from the `x-actor-id` header; the nil UUID when absent.
/// Authentication itself happens upstream of this service.
fn actor_from(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    match headers.get("x-actor-id") {
        None => Ok(Uuid::nil()),
        Some(value) => {
            let s = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("invalid x-actor-id header".to_string()))?;
            Uuid::parse_str(s)
                .map_err(|e| ApiError::BadRequest(format!("invalid x-actor-id header: {e}")))
        }
    }
}
