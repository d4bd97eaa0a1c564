//! Shipment record and carrier tracking events.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ShipmentId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::order::InvalidEnumValue;

/// Carrier-reported shipment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    LabelCreated,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::LabelCreated => "label_created",
            ShipmentStatus::PickedUp => "picked_up",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::OutForDelivery => "out_for_delivery",
            ShipmentStatus::Delivered => "delivered",
        }
    }

    /// Human-readable description for tracking displays.
    pub fn description(&self) -> &'static str {
        match self {
            ShipmentStatus::LabelCreated => "Shipping label created",
            ShipmentStatus::PickedUp => "Package picked up by carrier",
            ShipmentStatus::InTransit => "Package in transit",
            ShipmentStatus::OutForDelivery => "Out for delivery",
            ShipmentStatus::Delivered => "Package delivered",
        }
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "label_created" => Ok(ShipmentStatus::LabelCreated),
            "picked_up" => Ok(ShipmentStatus::PickedUp),
            "in_transit" => Ok(ShipmentStatus::InTransit),
            "out_for_delivery" => Ok(ShipmentStatus::OutForDelivery),
            "delivered" => Ok(ShipmentStatus::Delivered),
            other => Err(InvalidEnumValue {
                value: other.to_string(),
                expected: "label_created, picked_up, in_transit, out_for_delivery, delivered",
            }),
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a shipment's tracking history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: ShipmentStatus,
    pub description: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// A persisted shipment, one per label-creation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub shipment_id: ShipmentId,
    pub shipment_number: String,
    pub order_id: OrderId,
    pub carrier: String,
    pub service_type: String,
    pub tracking_number: String,
    pub label_url: String,
    pub estimated_delivery: DateTime<Utc>,
    pub shipping_cost: Money,
    pub weight: f64,
    pub dimensions: serde_json::Value,
    pub status: ShipmentStatus,
    pub tracking_events: Vec<TrackingEvent>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
}
