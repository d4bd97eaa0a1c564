//! The transactional order store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::{
    AuditRecord, OrderItem, OrderRecord, OrderStatus, PaymentTransaction, Shipment,
    ShipmentStatus, TrackingEvent, WorkflowStage,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stock position for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub on_hand: u32,
    pub reserved: u32,
}

impl StockLevel {
    /// Units still available to reserve.
    pub fn available(&self) -> u32 {
        self.on_hand.saturating_sub(self.reserved)
    }
}

/// Relational persistence for orders, items, payments, shipments, stock,
/// and the audit trail.
///
/// Every method executes as a single atomic transaction: a failure anywhere
/// inside rolls back every mutation the call performed. Audit records are
/// passed into the mutating methods so they commit with the change they
/// describe.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts an order with its items, reserving stock for every item.
    ///
    /// Any single reservation shortfall fails the whole call with
    /// [`StoreError::InsufficientStock`] and nothing is persisted.
    ///
    /// [`StoreError::InsufficientStock`]: crate::StoreError::InsufficientStock
    async fn create_order(
        &self,
        order: &OrderRecord,
        items: &[OrderItem],
        audit: AuditRecord,
    ) -> Result<()>;

    /// Loads an order by ID.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Loads the line items of an order.
    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Compare-and-swap stage transition.
    ///
    /// Moves the order from `from` to `to`, optionally updating the coarse
    /// lifecycle status. Fails with [`StoreError::StageConflict`] if a
    /// concurrent caller moved the order first; the caller reloads and
    /// re-evaluates rather than double-applying.
    ///
    /// [`StoreError::StageConflict`]: crate::StoreError::StageConflict
    async fn advance_stage(
        &self,
        order_id: OrderId,
        from: WorkflowStage,
        to: WorkflowStage,
        status: Option<OrderStatus>,
        audit: AuditRecord,
    ) -> Result<()>;

    /// Persists a completed payment transaction and marks the order paid
    /// (`payment_status = completed`, stage `payment_completed`).
    ///
    /// Guarded: fails with [`StoreError::UpdateConflict`] if the order is
    /// not awaiting payment, so a second concurrent payment can never be
    /// recorded.
    ///
    /// [`StoreError::UpdateConflict`]: crate::StoreError::UpdateConflict
    async fn record_payment(&self, txn: &PaymentTransaction, audit: AuditRecord) -> Result<()>;

    /// Loads the payment transaction for an order, if one was recorded.
    async fn get_payment(&self, order_id: OrderId) -> Result<Option<PaymentTransaction>>;

    /// Persists a shipment and marks the order shipped
    /// (status `shipped`, stage `shipped`, `shipped_at` set).
    async fn record_shipment(&self, shipment: &Shipment, audit: AuditRecord) -> Result<()>;

    /// Loads a shipment by carrier tracking number.
    async fn get_shipment_by_tracking(&self, tracking_number: &str) -> Result<Option<Shipment>>;

    /// Applies a carrier tracking update: replaces the shipment status and
    /// event history, and when `delivered_at` is set also moves the parent
    /// order to delivered (status, stage `delivered`, `delivered_at`).
    async fn update_tracking(
        &self,
        tracking_number: &str,
        status: ShipmentStatus,
        events: &[TrackingEvent],
        delivered_at: Option<DateTime<Utc>>,
        audit: AuditRecord,
    ) -> Result<()>;

    /// Cancels an order: releases every item reservation and sets status and
    /// stage to cancelled. Fails with [`StoreError::NotCancellable`] once
    /// goods have shipped or the order is terminal.
    ///
    /// [`StoreError::NotCancellable`]: crate::StoreError::NotCancellable
    async fn cancel_order(&self, order_id: OrderId, audit: AuditRecord) -> Result<()>;

    /// The audit trail of an order, oldest first.
    async fn audit_trail(&self, order_id: OrderId) -> Result<Vec<AuditRecord>>;

    /// Orders currently sitting in any of the given stages. Used by the
    /// stalled-order reconciliation query.
    async fn orders_in_stages(&self, stages: &[WorkflowStage]) -> Result<Vec<OrderRecord>>;

    /// Sets the on-hand quantity for a product (seeding / receiving).
    async fn set_stock(&self, product_id: ProductId, on_hand: u32) -> Result<()>;

    /// Reads the stock position for a product.
    async fn stock_level(&self, product_id: ProductId) -> Result<Option<StockLevel>>;
}
