//! HTTP API server for the order fulfillment engine.
//!
//! Exposes the processor operations over REST with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use fulfillment::{InMemoryCarrier, InMemoryGateway, OrderProcessor};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryKeyValueStore, OrderStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/stalled", get(routes::orders::stalled::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/audit", get(routes::orders::audit::<S>))
        .route("/orders/{id}/payment", post(routes::orders::payment::<S>))
        .route(
            "/orders/{id}/shipping-label",
            post(routes::orders::shipping_label::<S>),
        )
        .route(
            "/orders/{id}/signals/{signal}",
            post(routes::orders::signal::<S>),
        )
        .route("/orders/{id}/advance", post(routes::orders::advance::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/tracking/{tracking_number}", get(routes::tracking::get::<S>))
        .route("/stock/{product_id}", put(routes::stock::put::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state with in-memory backends.
///
/// Returns the gateway and carrier handles so tests can script declines and
/// tracking progress.
pub fn create_default_state<S: OrderStore + Clone + 'static>(
    store: S,
) -> (Arc<AppState<S>>, InMemoryGateway, InMemoryCarrier) {
    let gateway = InMemoryGateway::new();
    let carrier = InMemoryCarrier::new();
    let kv = InMemoryKeyValueStore::new();
    let processor =
        OrderProcessor::new(store.clone(), kv, gateway.clone(), carrier.clone());

    let state = Arc::new(AppState { processor, store });
    (state, gateway, carrier)
}
