//! Fulfillment error taxonomy.

use common::{Money, OrderId, ProductId};
use domain::ValidationError;
use store::StoreError;
use thiserror::Error;

use crate::carrier::CarrierError;
use crate::gateway::GatewayError;

/// Errors surfaced by the order processor.
///
/// Validation and precondition failures are detected before any mutation;
/// everything arising mid-transaction has already been rolled back by the
/// store when it reaches the caller.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The payload failed validation; nothing was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No order exists with the given ID.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// No shipment exists with the given tracking number.
    #[error("shipment not found: {0}")]
    ShipmentNotFound(String),

    /// The order is not in the lifecycle state the operation requires.
    #[error("order {order_id} precondition failed: {detail}")]
    Precondition { order_id: OrderId, detail: String },

    /// The payment amount does not equal the order total exactly.
    #[error("payment amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: Money, received: Money },

    /// Stock could not be reserved for an item.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    Inventory {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The payment gateway declined or failed.
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The carrier API rejected or failed.
    #[error("carrier error: {0}")]
    Carrier(#[from] CarrierError),

    /// An underlying store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for FulfillmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::OrderNotFound(id) => FulfillmentError::OrderNotFound(id),
            StoreError::ShipmentNotFound(tn) => FulfillmentError::ShipmentNotFound(tn),
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => FulfillmentError::Inventory {
                product_id,
                requested,
                available,
            },
            StoreError::StageConflict {
                order_id,
                expected,
                actual,
            } => FulfillmentError::Precondition {
                order_id,
                detail: format!("expected stage {expected}, found {actual}"),
            },
            StoreError::UpdateConflict(order_id) => FulfillmentError::Precondition {
                order_id,
                detail: "conflicting update".to_string(),
            },
            StoreError::NotCancellable { order_id, status } => FulfillmentError::Precondition {
                order_id,
                detail: format!("not cancellable from status {status}"),
            },
            other => FulfillmentError::Store(other),
        }
    }
}

/// Result type for fulfillment operations.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
