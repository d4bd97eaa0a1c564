//! Order record and its supporting enums.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::{WorkflowKind, WorkflowStage};

/// Error returned when parsing an enum from its stored string form.
#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?}, expected one of: {expected}")]
pub struct InvalidEnumValue {
    pub value: String,
    pub expected: &'static str,
}

/// Order priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "low, normal, high, urgent",
            }),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of commercial transaction the order represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    Sales,
    Return,
    Exchange,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Sales => "sales",
            OrderType::Return => "return",
            OrderType::Exchange => "exchange",
        }
    }
}

impl std::str::FromStr for OrderType {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sales" => Ok(OrderType::Sales),
            "return" => Ok(OrderType::Return),
            "exchange" => Ok(OrderType::Exchange),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "sales, return, exchange",
            }),
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse order lifecycle status, distinct from the finer workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Draft,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Returns true if a payment may be taken in this status.
    pub fn is_payable(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Processing)
    }

    /// Returns true if the order can still be cancelled.
    ///
    /// Once goods have left the warehouse the cancellation path closes;
    /// returns are a separate order type.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Draft | OrderStatus::Confirmed | OrderStatus::Processing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(OrderStatus::Draft),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "draft, confirmed, processing, shipped, delivered, completed, cancelled",
            }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "pending, completed, failed, refunded",
            }),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A postal address attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// A line item on an order.
///
/// Items are created atomically with the order and are immutable once
/// inventory has been reserved against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    /// Item-level discount, whole percent (0..=100).
    pub discount_percent: u32,
    /// Tax rate in basis points.
    pub tax_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl OrderItem {
    /// Line total before order-level adjustments.
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// An order row: the single source of truth for order state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub sales_rep_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub order_date: DateTime<Utc>,
    pub required_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub order_type: OrderType,
    pub source: String,
    /// Payment terms in days.
    pub payment_terms: u32,
    pub payment_method: Option<String>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub tax_amount: Money,
    pub shipping_amount: Money,
    pub total_amount: Money,
    pub currency: String,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub special_instructions: Option<String>,
    pub status: OrderStatus,
    pub workflow_kind: WorkflowKind,
    pub workflow_stage: WorkflowStage,
    pub payment_status: PaymentStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    /// JSON snapshot used for audit records.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "order_id": self.order_id,
            "order_number": self.order_number,
            "status": self.status,
            "workflow_stage": self.workflow_stage,
            "payment_status": self.payment_status,
            "total_amount": self.total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_round_trip() {
        for p in [
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Urgent,
        ] {
            let parsed: Priority = p.as_str().parse().unwrap();
            assert_eq!(parsed, p);
        }
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn status_round_trip() {
        for s in [
            OrderStatus::Draft,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            let parsed: OrderStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn payable_statuses() {
        assert!(OrderStatus::Confirmed.is_payable());
        assert!(OrderStatus::Processing.is_payable());
        assert!(!OrderStatus::Draft.is_payable());
        assert!(!OrderStatus::Shipped.is_payable());
        assert!(!OrderStatus::Cancelled.is_payable());
    }

    #[test]
    fn cancellable_statuses() {
        assert!(OrderStatus::Draft.is_cancellable());
        assert!(OrderStatus::Processing.is_cancellable());
        assert!(!OrderStatus::Shipped.is_cancellable());
        assert!(!OrderStatus::Completed.is_cancellable());
        assert!(!OrderStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn line_total() {
        let item = OrderItem {
            product_id: ProductId::new(),
            quantity: 3,
            unit_price: Money::from_cents(1000),
            discount_percent: 0,
            tax_rate: 0,
            notes: None,
        };
        assert_eq!(item.line_total().cents(), 3000);
    }

    #[test]
    fn enum_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Pending).unwrap(),
            "\"pending\""
        );
    }
}
