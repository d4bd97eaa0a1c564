//! Best-effort order cache.
//!
//! A read accelerator over the key-value store, never a source of truth:
//! misses, expired entries, and undecodable values all fall back to the
//! relational store silently.

use std::time::Duration;

use common::OrderId;
use domain::OrderRecord;
use store::KeyValueStore;

const CACHE_TTL: Duration = Duration::from_secs(3_600);

/// Caches hot order records as JSON.
#[derive(Clone)]
pub struct OrderCache<K> {
    kv: K,
}

impl<K: KeyValueStore> OrderCache<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    fn key(order_id: OrderId) -> String {
        format!("order:{order_id}")
    }

    /// Stores an order snapshot. Failures are reported to the caller, who
    /// logs and moves on.
    pub async fn put(&self, order: &OrderRecord) -> Result<(), store::StoreError> {
        let value = serde_json::to_value(order)?;
        self.kv
            .put_json(&Self::key(order.order_id), value, Some(CACHE_TTL))
            .await
    }

    /// Reads a cached order. Any problem reads as a miss.
    pub async fn get(&self, order_id: OrderId) -> Option<OrderRecord> {
        match self.kv.get_json(&Self::key(order_id)).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    /// Drops a cached order, e.g. after cancellation.
    pub async fn evict(&self, order_id: OrderId) {
        let _ = self.kv.remove(&Self::key(order_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{CustomerId, Money};
    use domain::{
        OrderStatus, OrderType, PaymentStatus, Priority, WorkflowKind, WorkflowStage,
    };
    use store::InMemoryKeyValueStore;
    use uuid::Uuid;

    fn sample_order() -> OrderRecord {
        let now = Utc::now();
        OrderRecord {
            order_id: OrderId::new(),
            order_number: "ORD2608070001".to_string(),
            customer_id: CustomerId::new(),
            sales_rep_id: None,
            agent_id: None,
            order_date: now,
            required_date: None,
            priority: Priority::Normal,
            order_type: OrderType::Sales,
            source: "manual".to_string(),
            payment_terms: 30,
            payment_method: None,
            subtotal: Money::from_cents(5500),
            discount_amount: Money::zero(),
            tax_amount: Money::from_cents(350),
            shipping_amount: Money::from_cents(500),
            total_amount: Money::from_cents(6350),
            currency: "INR".to_string(),
            shipping_address: None,
            billing_address: None,
            special_instructions: None,
            status: OrderStatus::Draft,
            workflow_kind: WorkflowKind::Standard,
            workflow_stage: WorkflowStage::Approval,
            payment_status: PaymentStatus::Pending,
            created_by: Uuid::nil(),
            created_at: now,
            updated_at: now,
            shipped_at: None,
            delivered_at: None,
        }
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let cache = OrderCache::new(InMemoryKeyValueStore::new());
        let order = sample_order();
        cache.put(&order).await.unwrap();

        let cached = cache.get(order.order_id).await.unwrap();
        assert_eq!(cached.order_number, order.order_number);
        assert_eq!(cached.workflow_stage, WorkflowStage::Approval);
    }

    #[tokio::test]
    async fn miss_reads_as_none() {
        let cache = OrderCache::new(InMemoryKeyValueStore::new());
        assert!(cache.get(OrderId::new()).await.is_none());
    }

    #[tokio::test]
    async fn undecodable_entry_reads_as_miss() {
        let kv = InMemoryKeyValueStore::new();
        let cache = OrderCache::new(kv.clone());
        let order_id = OrderId::new();
        kv.put_json(
            &format!("order:{order_id}"),
            serde_json::json!("not an order"),
            None,
        )
        .await
        .unwrap();
        assert!(cache.get(order_id).await.is_none());
    }

    #[tokio::test]
    async fn evict_removes_entry() {
        let cache = OrderCache::new(InMemoryKeyValueStore::new());
        let order = sample_order();
        cache.put(&order).await.unwrap();
        cache.evict(order.order_id).await;
        assert!(cache.get(order.order_id).await.is_none());
    }
}
