//! Payment gateway contract and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A charge request sent to the gateway.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub currency: String,
    pub payment_method: String,
    pub card_number: Option<String>,
}

/// A confirmed charge as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCharge {
    pub gateway_transaction_id: String,
    pub authorization_code: String,
    /// Opaque gateway payload, persisted verbatim.
    pub response: serde_json::Value,
    pub fees: Money,
}

/// Gateway failure modes. A decline is an error, never a panic; the caller
/// rolls back and surfaces it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment declined: {reason}")]
    Declined { reason: String },

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// External payment processor contract.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the given amount. Returns the gateway's transaction
    /// reference on success.
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayCharge, GatewayError>;
}

/// Gateway fee in basis points (2.5%).
const FEE_BP: u32 = 250;

#[derive(Debug)]
struct InMemoryGatewayState {
    charges: Vec<(OrderId, Money)>,
    decline_cards: HashSet<String>,
    next_id: u32,
    fail_on_charge: bool,
}

impl Default for InMemoryGatewayState {
    fn default() -> Self {
        // Well-known decline test cards.
        let decline_cards = ["4000000000000002", "4000000000000069"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            charges: Vec::new(),
            decline_cards,
            next_id: 0,
            fail_on_charge: false,
        }
    }
}

/// Deterministic in-memory gateway for tests and the default server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to refuse the next charge call.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    /// Returns the number of successful charges.
    pub fn charge_count(&self) -> usize {
        self.state.read().unwrap().charges.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayCharge, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_charge {
            return Err(GatewayError::Unavailable(
                "gateway connection refused".to_string(),
            ));
        }

        if let Some(card) = &request.card_number
            && state.decline_cards.contains(card)
        {
            return Err(GatewayError::Declined {
                reason: "insufficient funds".to_string(),
            });
        }

        state.next_id += 1;
        let gateway_transaction_id = format!("GW-{:06}", state.next_id);
        let authorization_code = format!("AUTH-{:06}", state.next_id);
        state.charges.push((request.order_id, request.amount));

        Ok(GatewayCharge {
            gateway_transaction_id: gateway_transaction_id.clone(),
            authorization_code: authorization_code.clone(),
            response: serde_json::json!({
                "status": "SUCCESS",
                "authorization_code": authorization_code,
                "reference_number": gateway_transaction_id,
            }),
            fees: request.amount.scale_bp(FEE_BP),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(card: Option<&str>) -> ChargeRequest {
        ChargeRequest {
            order_id: OrderId::new(),
            order_number: "ORD2608070001".to_string(),
            customer_id: CustomerId::new(),
            amount: Money::from_cents(6350),
            currency: "INR".to_string(),
            payment_method: "card".to_string(),
            card_number: card.map(String::from),
        }
    }

    #[tokio::test]
    async fn successful_charge_reports_fees() {
        let gateway = InMemoryGateway::new();
        let charge = gateway.charge(&request(None)).await.unwrap();
        assert!(charge.gateway_transaction_id.starts_with("GW-"));
        assert_eq!(charge.fees.cents(), 158);
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn decline_card_is_rejected() {
        let gateway = InMemoryGateway::new();
        let result = gateway.charge(&request(Some("4000000000000002"))).await;
        assert!(matches!(result, Err(GatewayError::Declined { .. })));
        assert_eq!(gateway.charge_count(), 0);
    }

    #[tokio::test]
    async fn fail_switch_makes_gateway_unavailable() {
        let gateway = InMemoryGateway::new();
        gateway.set_fail_on_charge(true);
        let result = gateway.charge(&request(None)).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn transaction_ids_are_sequential() {
        let gateway = InMemoryGateway::new();
        let a = gateway.charge(&request(None)).await.unwrap();
        let b = gateway.charge(&request(None)).await.unwrap();
        assert_eq!(a.gateway_transaction_id, "GW-000001");
        assert_eq!(b.gateway_transaction_id, "GW-000002");
    }
}
