//! Domain layer for the order fulfillment system.
//!
//! Holds the order data model, the immutable workflow configuration with its
//! auto/manual stage rules, and the fail-fast order validator. Nothing in
//! this crate performs I/O; persistence and orchestration live elsewhere.

pub mod audit;
pub mod order;
pub mod payment;
pub mod shipment;
pub mod validate;
pub mod workflow;

pub use audit::{AuditOperation, AuditRecord};
pub use order::{
    Address, InvalidEnumValue, OrderItem, OrderRecord, OrderStatus, OrderType, PaymentStatus,
    Priority,
};
pub use payment::{PaymentTransaction, TransactionStatus};
pub use shipment::{Shipment, ShipmentStatus, TrackingEvent};
pub use validate::{
    FieldError, NewOrderItem, NewOrderRequest, OrderDraft, ValidationError, validate_order,
};
pub use workflow::{StageRule, StageSignal, WorkflowConfig, WorkflowKind, WorkflowStage};
