//! Payment transaction record.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, TransactionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::order::InvalidEnumValue;

/// Outcome of a gateway charge as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "completed, failed",
            }),
        }
    }
}

/// A persisted payment transaction.
///
/// Under the exact-amount policy at most one completed transaction exists per
/// order, created only after gateway confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub transaction_id: TransactionId,
    pub transaction_number: String,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub payment_method: String,
    pub gateway: String,
    pub gateway_transaction_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: TransactionStatus,
    pub processed_at: DateTime<Utc>,
    /// Opaque gateway payload, stored for dispute handling.
    pub gateway_response: serde_json::Value,
    /// Amount minus gateway fees.
    pub net_amount: Money,
    pub created_by: Uuid,
}
