//! In-memory store implementations.
//!
//! The order store keeps every table behind one `RwLock`, so each trait
//! method is naturally atomic: reads validate first and mutations only start
//! once the whole call is known to succeed, mirroring the commit/rollback
//! behavior of the PostgreSQL implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::{
    AuditRecord, OrderItem, OrderRecord, OrderStatus, PaymentStatus, PaymentTransaction, Shipment,
    ShipmentStatus, TrackingEvent, WorkflowStage,
};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::kv::KeyValueStore;
use crate::store::{OrderStore, StockLevel};

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, OrderRecord>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    payments: HashMap<OrderId, PaymentTransaction>,
    /// Shipments keyed by tracking number.
    shipments: HashMap<String, Shipment>,
    stock: HashMap<ProductId, StockLevel>,
    audit: Vec<AuditRecord>,
}

/// In-memory order store for tests and the default server.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of persisted orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the total number of audit records across all orders.
    pub async fn audit_count(&self) -> usize {
        self.tables.read().await.audit.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(
        &self,
        order: &OrderRecord,
        items: &[OrderItem],
        audit: AuditRecord,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;

        // Validate every reservation before touching anything, so a
        // shortfall on any item leaves no partial state behind.
        let mut pending: HashMap<ProductId, u32> = HashMap::new();
        for item in items {
            let entry = pending.entry(item.product_id).or_insert(0);
            *entry += item.quantity;
            let available = tables
                .stock
                .get(&item.product_id)
                .map(StockLevel::available)
                .unwrap_or(0);
            if available < *entry {
                return Err(StoreError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: available.saturating_sub(*entry - item.quantity),
                });
            }
        }

        for (product_id, quantity) in pending {
            if let Some(level) = tables.stock.get_mut(&product_id) {
                level.reserved += quantity;
            }
        }
        tables.orders.insert(order.order_id, order.clone());
        tables.items.insert(order.order_id, items.to_vec());
        tables.audit.push(audit);
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self
            .tables
            .read()
            .await
            .items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn advance_stage(
        &self,
        order_id: OrderId,
        from: WorkflowStage,
        to: WorkflowStage,
        status: Option<OrderStatus>,
        audit: AuditRecord,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if order.workflow_stage != from {
            return Err(StoreError::StageConflict {
                order_id,
                expected: from,
                actual: order.workflow_stage,
            });
        }

        order.workflow_stage = to;
        if let Some(status) = status {
            order.status = status;
        }
        order.updated_at = Utc::now();
        tables.audit.push(audit);
        Ok(())
    }

    async fn record_payment(&self, txn: &PaymentTransaction, audit: AuditRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&txn.order_id)
            .ok_or(StoreError::OrderNotFound(txn.order_id))?;

        if order.payment_status != PaymentStatus::Pending {
            return Err(StoreError::UpdateConflict(txn.order_id));
        }

        order.payment_status = PaymentStatus::Completed;
        order.workflow_stage = WorkflowStage::PaymentCompleted;
        order.updated_at = Utc::now();
        tables.payments.insert(txn.order_id, txn.clone());
        tables.audit.push(audit);
        Ok(())
    }

    async fn get_payment(&self, order_id: OrderId) -> Result<Option<PaymentTransaction>> {
        Ok(self.tables.read().await.payments.get(&order_id).cloned())
    }

    async fn record_shipment(&self, shipment: &Shipment, audit: AuditRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&shipment.order_id)
            .ok_or(StoreError::OrderNotFound(shipment.order_id))?;

        if matches!(
            order.status,
            OrderStatus::Shipped
                | OrderStatus::Delivered
                | OrderStatus::Completed
                | OrderStatus::Cancelled
        ) {
            return Err(StoreError::UpdateConflict(shipment.order_id));
        }

        let now = Utc::now();
        order.status = OrderStatus::Shipped;
        order.workflow_stage = WorkflowStage::Shipped;
        order.shipped_at = Some(now);
        order.updated_at = now;
        tables
            .shipments
            .insert(shipment.tracking_number.clone(), shipment.clone());
        tables.audit.push(audit);
        Ok(())
    }

    async fn get_shipment_by_tracking(&self, tracking_number: &str) -> Result<Option<Shipment>> {
        Ok(self
            .tables
            .read()
            .await
            .shipments
            .get(tracking_number)
            .cloned())
    }

    async fn update_tracking(
        &self,
        tracking_number: &str,
        status: ShipmentStatus,
        events: &[TrackingEvent],
        delivered_at: Option<DateTime<Utc>>,
        audit: AuditRecord,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let shipment = tables
            .shipments
            .get_mut(tracking_number)
            .ok_or_else(|| StoreError::ShipmentNotFound(tracking_number.to_string()))?;

        shipment.status = status;
        shipment.tracking_events = events.to_vec();
        shipment.delivered_at = delivered_at;
        let order_id = shipment.order_id;

        if let Some(at) = delivered_at
            && let Some(order) = tables.orders.get_mut(&order_id)
        {
            order.status = OrderStatus::Delivered;
            order.workflow_stage = WorkflowStage::Delivered;
            order.delivered_at = Some(at);
            order.updated_at = Utc::now();
        }
        tables.audit.push(audit);
        Ok(())
    }

    async fn cancel_order(&self, order_id: OrderId, audit: AuditRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if !order.status.is_cancellable() {
            return Err(StoreError::NotCancellable {
                order_id,
                status: order.status,
            });
        }

        let items = tables.items.get(&order_id).cloned().unwrap_or_default();
        for item in &items {
            if let Some(level) = tables.stock.get_mut(&item.product_id) {
                level.reserved = level.reserved.saturating_sub(item.quantity);
            }
        }

        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.status = OrderStatus::Cancelled;
        order.workflow_stage = WorkflowStage::Cancelled;
        order.updated_at = Utc::now();
        tables.audit.push(audit);
        Ok(())
    }

    async fn audit_trail(&self, order_id: OrderId) -> Result<Vec<AuditRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .audit
            .iter()
            .filter(|a| a.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn orders_in_stages(&self, stages: &[WorkflowStage]) -> Result<Vec<OrderRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .filter(|o| stages.contains(&o.workflow_stage))
            .cloned()
            .collect())
    }

    async fn set_stock(&self, product_id: ProductId, on_hand: u32) -> Result<()> {
        let mut tables = self.tables.write().await;
        let level = tables.stock.entry(product_id).or_insert(StockLevel {
            on_hand: 0,
            reserved: 0,
        });
        level.on_hand = on_hand;
        Ok(())
    }

    async fn stock_level(&self, product_id: ProductId) -> Result<Option<StockLevel>> {
        Ok(self.tables.read().await.stock.get(&product_id).copied())
    }
}

struct KvEntry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl KvEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory key-value store with per-key expiry.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, KvEntry>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let current = entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.value.as_u64())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(
            key.to_string(),
            KvEntry {
                value: serde_json::Value::from(next),
                expires_at: Some(now + ttl),
            },
        );
        Ok(next)
    }

    async fn put_json(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            KvEntry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
