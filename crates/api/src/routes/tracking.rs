//! Shipment tracking endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use fulfillment::TrackingReport;
use store::OrderStore;

use crate::error::ApiError;
use crate::routes::orders::AppState;

/// GET /tracking/{tracking_number} — poll carrier tracking and apply any
/// status change. Safe to call repeatedly.
pub async fn get<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(tracking_number): Path<String>,
) -> Result<Json<TrackingReport>, ApiError> {
    let report = state.processor.track_shipment(&tracking_number).await?;
    Ok(Json(report))
}
