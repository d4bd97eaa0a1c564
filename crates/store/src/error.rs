use common::{OrderId, ProductId};
use domain::{OrderStatus, WorkflowStage};
use thiserror::Error;

/// Errors that can occur when interacting with the order or key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No order exists with the given ID.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// No shipment exists with the given tracking number.
    #[error("shipment not found: {0}")]
    ShipmentNotFound(String),

    /// A reservation could not be satisfied; the enclosing transaction was
    /// rolled back.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A compare-and-swap on the workflow stage lost a race: the order was
    /// no longer at the expected stage.
    #[error("stage conflict for order {order_id}: expected {expected}, found {actual}")]
    StageConflict {
        order_id: OrderId,
        expected: WorkflowStage,
        actual: WorkflowStage,
    },

    /// A guarded update matched no row (e.g. payment already recorded or
    /// shipment already issued).
    #[error("conflicting update for order {0}")]
    UpdateConflict(OrderId),

    /// The order can no longer be cancelled.
    #[error("order {order_id} is not cancellable from status {status}")]
    NotCancellable {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be interpreted.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl From<domain::InvalidEnumValue> for StoreError {
    fn from(e: domain::InvalidEnumValue) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
