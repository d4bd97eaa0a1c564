//! Carrier label and tracking contract with an in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{Money, OrderId};
use domain::{Address, ShipmentStatus, TrackingEvent};
use thiserror::Error;

/// A label request sent to the carrier.
#[derive(Debug, Clone)]
pub struct LabelRequest {
    pub order_id: OrderId,
    pub order_number: String,
    pub carrier: String,
    pub service_type: String,
    pub shipping_cost: Money,
    pub weight: f64,
    pub destination: Option<Address>,
}

/// A label issued by the carrier.
#[derive(Debug, Clone)]
pub struct CarrierLabel {
    pub tracking_number: String,
    pub label_url: String,
    pub estimated_delivery: DateTime<Utc>,
}

/// Current tracking state as reported by the carrier.
#[derive(Debug, Clone)]
pub struct CarrierTracking {
    pub status: ShipmentStatus,
    pub events: Vec<TrackingEvent>,
}

/// Carrier failure modes.
#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("label rejected: {0}")]
    LabelRejected(String),

    #[error("tracking unavailable: {0}")]
    TrackingUnavailable(String),

    #[error("unknown tracking number: {0}")]
    UnknownTrackingNumber(String),
}

/// External shipping carrier contract: label issuance and tracking lookup.
#[async_trait]
pub trait CarrierApi: Send + Sync {
    async fn create_label(&self, request: &LabelRequest) -> Result<CarrierLabel, CarrierError>;

    async fn tracking(&self, tracking_number: &str) -> Result<CarrierTracking, CarrierError>;
}

#[derive(Debug, Default)]
struct InMemoryCarrierState {
    /// Tracking numbers issued, with their service type.
    labels: HashMap<String, String>,
    /// Scripted tracking state per tracking number.
    scripted: HashMap<String, ShipmentStatus>,
    next_id: u32,
    fail_on_label: bool,
    fail_on_tracking: bool,
}

/// Deterministic in-memory carrier.
///
/// Tests script the progress of a shipment with [`set_tracking_status`];
/// unscripted tracking numbers report `label_created`.
///
/// [`set_tracking_status`]: InMemoryCarrier::set_tracking_status
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarrier {
    state: Arc<RwLock<InMemoryCarrierState>>,
}

impl InMemoryCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the carrier to reject the next label request.
    pub fn set_fail_on_label(&self, fail: bool) {
        self.state.write().unwrap().fail_on_label = fail;
    }

    /// Configures the tracking endpoint to fail.
    pub fn set_fail_on_tracking(&self, fail: bool) {
        self.state.write().unwrap().fail_on_tracking = fail;
    }

    /// Scripts the carrier-reported status for a tracking number.
    pub fn set_tracking_status(&self, tracking_number: &str, status: ShipmentStatus) {
        self.state
            .write()
            .unwrap()
            .scripted
            .insert(tracking_number.to_string(), status);
    }

    /// Returns the number of labels issued.
    pub fn label_count(&self) -> usize {
        self.state.read().unwrap().labels.len()
    }

    fn events_up_to(status: ShipmentStatus) -> Vec<TrackingEvent> {
        let sequence = [
            ShipmentStatus::LabelCreated,
            ShipmentStatus::PickedUp,
            ShipmentStatus::InTransit,
            ShipmentStatus::OutForDelivery,
            ShipmentStatus::Delivered,
        ];
        let reached = sequence.iter().position(|s| *s == status).unwrap_or(0);
        let now = Utc::now();
        sequence[..=reached]
            .iter()
            .enumerate()
            .map(|(i, s)| TrackingEvent {
                status: *s,
                description: s.description().to_string(),
                location: "Distribution Center".to_string(),
                timestamp: now - Duration::hours(12 * (reached - i) as i64),
            })
            .collect()
    }
}

#[async_trait]
impl CarrierApi for InMemoryCarrier {
    async fn create_label(&self, request: &LabelRequest) -> Result<CarrierLabel, CarrierError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_label {
            return Err(CarrierError::LabelRejected(
                "carrier service unavailable".to_string(),
            ));
        }

        state.next_id += 1;
        let tracking_number = format!(
            "{}{:08}",
            request.carrier.to_uppercase().replace(' ', ""),
            state.next_id
        );
        state
            .labels
            .insert(tracking_number.clone(), request.service_type.clone());

        let transit_days = if request.service_type == "express" { 1 } else { 3 };

        Ok(CarrierLabel {
            tracking_number: tracking_number.clone(),
            label_url: format!("https://labels.example-carrier.com/{tracking_number}.pdf"),
            estimated_delivery: Utc::now() + Duration::days(transit_days),
        })
    }

    async fn tracking(&self, tracking_number: &str) -> Result<CarrierTracking, CarrierError> {
        let state = self.state.read().unwrap();

        if state.fail_on_tracking {
            return Err(CarrierError::TrackingUnavailable(
                "carrier tracking timed out".to_string(),
            ));
        }

        if !state.labels.contains_key(tracking_number) {
            return Err(CarrierError::UnknownTrackingNumber(
                tracking_number.to_string(),
            ));
        }

        let status = state
            .scripted
            .get(tracking_number)
            .copied()
            .unwrap_or(ShipmentStatus::LabelCreated);

        Ok(CarrierTracking {
            status,
            events: Self::events_up_to(status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(service_type: &str) -> LabelRequest {
        LabelRequest {
            order_id: OrderId::new(),
            order_number: "ORD2608070001".to_string(),
            carrier: "fastship".to_string(),
            service_type: service_type.to_string(),
            shipping_cost: Money::from_cents(500),
            weight: 1.2,
            destination: None,
        }
    }

    #[tokio::test]
    async fn label_issues_carrier_prefixed_tracking_number() {
        let carrier = InMemoryCarrier::new();
        let label = carrier.create_label(&request("standard")).await.unwrap();
        assert!(label.tracking_number.starts_with("FASTSHIP"));
        assert!(label.label_url.ends_with(".pdf"));
        assert_eq!(carrier.label_count(), 1);
    }

    #[tokio::test]
    async fn express_delivers_sooner_than_standard() {
        let carrier = InMemoryCarrier::new();
        let express = carrier.create_label(&request("express")).await.unwrap();
        let standard = carrier.create_label(&request("standard")).await.unwrap();
        assert!(express.estimated_delivery < standard.estimated_delivery);
    }

    #[tokio::test]
    async fn unscripted_tracking_reports_label_created() {
        let carrier = InMemoryCarrier::new();
        let label = carrier.create_label(&request("standard")).await.unwrap();
        let tracking = carrier.tracking(&label.tracking_number).await.unwrap();
        assert_eq!(tracking.status, ShipmentStatus::LabelCreated);
        assert_eq!(tracking.events.len(), 1);
    }

    #[tokio::test]
    async fn scripted_status_includes_full_event_history() {
        let carrier = InMemoryCarrier::new();
        let label = carrier.create_label(&request("standard")).await.unwrap();
        carrier.set_tracking_status(&label.tracking_number, ShipmentStatus::Delivered);

        let tracking = carrier.tracking(&label.tracking_number).await.unwrap();
        assert_eq!(tracking.status, ShipmentStatus::Delivered);
        assert_eq!(tracking.events.len(), 5);
        assert_eq!(tracking.events[0].status, ShipmentStatus::LabelCreated);
        assert_eq!(tracking.events[4].status, ShipmentStatus::Delivered);
        // events are ordered oldest first
        assert!(tracking.events[0].timestamp <= tracking.events[4].timestamp);
    }

    #[tokio::test]
    async fn unknown_tracking_number_errors() {
        let carrier = InMemoryCarrier::new();
        let result = carrier.tracking("NOPE123").await;
        assert!(matches!(result, Err(CarrierError::UnknownTrackingNumber(_))));
    }

    #[tokio::test]
    async fn label_failure_switch() {
        let carrier = InMemoryCarrier::new();
        carrier.set_fail_on_label(true);
        let result = carrier.create_label(&request("standard")).await;
        assert!(matches!(result, Err(CarrierError::LabelRejected(_))));
        assert_eq!(carrier.label_count(), 0);
    }
}
