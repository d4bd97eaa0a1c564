//! Audit trail records.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of order-affecting operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    Create,
    Stage,
    Payment,
    Shipment,
    Tracking,
    Cancel,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Create => "CREATE",
            AuditOperation::Stage => "STAGE",
            AuditOperation::Payment => "PAYMENT",
            AuditOperation::Shipment => "SHIPMENT",
            AuditOperation::Tracking => "TRACKING",
            AuditOperation::Cancel => "CANCEL",
        }
    }
}

impl std::str::FromStr for AuditOperation {
    type Err = crate::order::InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditOperation::Create),
            "STAGE" => Ok(AuditOperation::Stage),
            "PAYMENT" => Ok(AuditOperation::Payment),
            "SHIPMENT" => Ok(AuditOperation::Shipment),
            "TRACKING" => Ok(AuditOperation::Tracking),
            "CANCEL" => Ok(AuditOperation::Cancel),
            other => Err(crate::order::InvalidEnumValue {
                value: other.to_string(),
                expected: "CREATE, STAGE, PAYMENT, SHIPMENT, TRACKING, CANCEL",
            }),
        }
    }
}

/// An immutable before/after snapshot of an order-affecting operation.
///
/// Written in the same transaction as the mutation it describes, so the
/// trail can never disagree with committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub order_id: OrderId,
    pub operation: AuditOperation,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub actor: Uuid,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        order_id: OrderId,
        operation: AuditOperation,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
        actor: Uuid,
    ) -> Self {
        Self {
            order_id,
            operation,
            before,
            after,
            actor,
            recorded_at: Utc::now(),
        }
    }
}
