//! Stock seeding endpoint.
//!
//! Inventory management proper lives in another system; this seam only
//! exists so the reservation table can be stocked.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use serde::Deserialize;
use store::OrderStore;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct StockRequest {
    pub on_hand: u32,
}

/// PUT /stock/{product_id} — set the on-hand quantity for a product.
pub async fn put<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
    Json(request): Json<StockRequest>,
) -> Result<StatusCode, ApiError> {
    let uuid = Uuid::parse_str(&product_id)
        .map_err(|e| ApiError::BadRequest(format!("invalid product id: {e}")))?;
    state
        .store
        .set_stock(ProductId::from_uuid(uuid), request.on_hand)
        .await
        .map_err(|e| ApiError::Fulfillment(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}
