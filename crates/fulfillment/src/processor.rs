//! The order processor: every public operation of the workflow engine.
//!
//! Each operation validates its preconditions against current order state,
//! performs external calls (gateway, carrier) before any store transaction
//! opens, executes one atomic store mutation, and then drives automatic
//! stage advancement. Advancement after a successful commit is best-effort:
//! the committed operation stands even if advancement stalls, and stalled
//! orders remain visible for an operator retry.

use chrono::Utc;
use common::{Money, OrderId, ShipmentId, TransactionId};
use domain::{
    AuditOperation, AuditRecord, NewOrderRequest, OrderRecord, OrderStatus, PaymentStatus,
    PaymentTransaction, ShipmentStatus, StageSignal, TrackingEvent, TransactionStatus,
    WorkflowConfig, WorkflowStage, validate_order,
};
use serde::{Deserialize, Serialize};
use store::{KeyValueStore, OrderStore, StoreError};
use uuid::Uuid;

use crate::cache::OrderCache;
use crate::carrier::{CarrierApi, LabelRequest};
use crate::error::{FulfillmentError, Result};
use crate::gateway::{ChargeRequest, PaymentGateway};
use crate::sequence::{EntityPrefix, SequenceGenerator};

/// Result of a successful order creation.
#[derive(Debug, Clone, Serialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    pub workflow_stage: WorkflowStage,
    pub status: OrderStatus,
}

/// Payment submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    #[serde(rename = "amount_cents")]
    pub amount: Money,
    pub payment_method: String,
    pub gateway: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
}

/// Result of a successful payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub transaction_id: TransactionId,
    pub transaction_number: String,
}

/// Shipping label request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingRequest {
    pub carrier: String,
    pub service_type: String,
    #[serde(rename = "shipping_cost_cents")]
    pub shipping_cost: Money,
    pub weight: f64,
    #[serde(default)]
    pub dimensions: serde_json::Value,
}

/// Result of a successful label issuance.
#[derive(Debug, Clone, Serialize)]
pub struct LabelIssued {
    pub shipment_id: ShipmentId,
    pub shipment_number: String,
    pub tracking_number: String,
    pub label_url: String,
    pub estimated_delivery: chrono::DateTime<Utc>,
}

/// Current tracking state returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingReport {
    pub tracking_number: String,
    pub status: ShipmentStatus,
    pub events: Vec<TrackingEvent>,
    pub estimated_delivery: chrono::DateTime<Utc>,
    pub order_number: String,
}

/// Orchestrates order creation, payment, shipping, and tracking against a
/// transactional store and external gateway/carrier contracts.
pub struct OrderProcessor<S, K, G, C> {
    store: S,
    sequence: SequenceGenerator<K>,
    cache: OrderCache<K>,
    gateway: G,
    carrier: C,
    config: WorkflowConfig,
}

impl<S, K, G, C> OrderProcessor<S, K, G, C>
where
    S: OrderStore,
    K: KeyValueStore + Clone,
    G: PaymentGateway,
    C: CarrierApi,
{
    /// Creates a processor with the default workflow configuration.
    pub fn new(store: S, kv: K, gateway: G, carrier: C) -> Self {
        Self {
            store,
            sequence: SequenceGenerator::new(kv.clone()),
            cache: OrderCache::new(kv),
            gateway,
            carrier,
            config: WorkflowConfig::default_flows(),
        }
    }

    /// Validates, persists, and auto-advances a new order.
    ///
    /// The store call is one transaction covering the order row, its items,
    /// every inventory reservation, and the creation audit record.
    #[tracing::instrument(skip(self, request))]
    pub async fn create_order(
        &self,
        request: &NewOrderRequest,
        actor: Uuid,
    ) -> Result<OrderCreated> {
        let draft = validate_order(request)?;

        let order_number = self.sequence.next(EntityPrefix::Order).await?;
        let now = Utc::now();
        let order = OrderRecord {
            order_id: OrderId::new(),
            order_number: order_number.clone(),
            customer_id: draft.customer_id,
            sales_rep_id: draft.sales_rep_id,
            agent_id: draft.agent_id,
            order_date: draft.order_date.unwrap_or(now),
            required_date: draft.required_date,
            priority: draft.priority,
            order_type: draft.order_type,
            source: draft.source,
            payment_terms: draft.payment_terms,
            payment_method: draft.payment_method,
            subtotal: draft.subtotal,
            discount_amount: draft.discount_amount,
            tax_amount: draft.tax_amount,
            shipping_amount: draft.shipping_amount,
            total_amount: draft.total_amount,
            currency: draft.currency,
            shipping_address: draft.shipping_address,
            billing_address: draft.billing_address,
            special_instructions: draft.special_instructions,
            status: OrderStatus::Draft,
            workflow_kind: draft.workflow_kind,
            workflow_stage: WorkflowConfig::initial_stage(),
            payment_status: PaymentStatus::Pending,
            created_by: actor,
            created_at: now,
            updated_at: now,
            shipped_at: None,
            delivered_at: None,
        };

        let audit = AuditRecord::new(
            order.order_id,
            AuditOperation::Create,
            None,
            Some(order.snapshot()),
            actor,
        );
        self.store.create_order(&order, &draft.items, audit).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.order_id,
            order_number = %order_number,
            customer_id = %order.customer_id,
            total = %order.total_amount,
            "order created"
        );

        // Post-commit: the order is durable even if advancement stalls.
        let order = match self.run_advance(order.order_id, actor).await {
            Ok(advanced) => advanced,
            Err(e) => {
                tracing::warn!(order_id = %order.order_id, error = %e, "post-commit advancement stalled");
                metrics::counter!("workflow_advance_failures_total").increment(1);
                order
            }
        };
        self.cache_best_effort(&order).await;

        Ok(OrderCreated {
            order_id: order.order_id,
            order_number,
            workflow_stage: order.workflow_stage,
            status: order.status,
        })
    }

    /// Takes a payment for an order.
    ///
    /// The amount must equal the order total exactly; partial payments are
    /// rejected outright. The gateway is charged before the store
    /// transaction opens, so no database lock spans gateway latency.
    #[tracing::instrument(skip(self, request))]
    pub async fn process_payment(
        &self,
        order_id: OrderId,
        request: &PaymentRequest,
        actor: Uuid,
    ) -> Result<PaymentReceipt> {
        let order = self.require_order(order_id).await?;

        if order.payment_status == PaymentStatus::Completed {
            return Err(FulfillmentError::Precondition {
                order_id,
                detail: "payment already completed".to_string(),
            });
        }
        if !order.status.is_payable() {
            return Err(FulfillmentError::Precondition {
                order_id,
                detail: format!("status {} is not payable", order.status),
            });
        }
        if let Some(currency) = &request.currency
            && currency != &order.currency
        {
            return Err(FulfillmentError::Precondition {
                order_id,
                detail: format!("currency {currency} does not match order currency {}", order.currency),
            });
        }
        if request.amount != order.total_amount {
            metrics::counter!("payment_failures_total").increment(1);
            return Err(FulfillmentError::AmountMismatch {
                expected: order.total_amount,
                received: request.amount,
            });
        }

        let charge = self
            .gateway
            .charge(&ChargeRequest {
                order_id,
                order_number: order.order_number.clone(),
                customer_id: order.customer_id,
                amount: request.amount,
                currency: order.currency.clone(),
                payment_method: request.payment_method.clone(),
                card_number: request.card_number.clone(),
            })
            .await
            .inspect_err(|_| {
                metrics::counter!("payment_failures_total").increment(1);
            })?;

        let transaction_number = self.sequence.next(EntityPrefix::Transaction).await?;
        let txn = PaymentTransaction {
            transaction_id: TransactionId::new(),
            transaction_number: transaction_number.clone(),
            order_id,
            customer_id: order.customer_id,
            payment_method: request.payment_method.clone(),
            gateway: request.gateway.clone(),
            gateway_transaction_id: charge.gateway_transaction_id,
            amount: request.amount,
            currency: order.currency.clone(),
            status: TransactionStatus::Completed,
            processed_at: Utc::now(),
            gateway_response: charge.response,
            net_amount: request.amount - charge.fees,
            created_by: actor,
        };

        let audit = AuditRecord::new(
            order_id,
            AuditOperation::Payment,
            Some(order.snapshot()),
            Some(serde_json::json!({
                "transaction_number": transaction_number,
                "amount": txn.amount,
                "payment_status": PaymentStatus::Completed,
            })),
            actor,
        );
        self.store.record_payment(&txn, audit).await?;

        metrics::counter!("payments_processed_total").increment(1);
        tracing::info!(
            %order_id,
            transaction_number = %transaction_number,
            amount = %txn.amount,
            "payment processed"
        );

        self.advance_best_effort(order_id, actor).await;

        Ok(PaymentReceipt {
            transaction_id: txn.transaction_id,
            transaction_number,
        })
    }

    /// Issues a shipping label for a fully paid order and marks it shipped.
    #[tracing::instrument(skip(self, request))]
    pub async fn create_shipping_label(
        &self,
        order_id: OrderId,
        request: &ShippingRequest,
        actor: Uuid,
    ) -> Result<LabelIssued> {
        let order = self.require_order(order_id).await?;

        if order.payment_status != PaymentStatus::Completed {
            return Err(FulfillmentError::Precondition {
                order_id,
                detail: "payment not completed".to_string(),
            });
        }
        if matches!(
            order.status,
            OrderStatus::Shipped
                | OrderStatus::Delivered
                | OrderStatus::Completed
                | OrderStatus::Cancelled
        ) {
            return Err(FulfillmentError::Precondition {
                order_id,
                detail: format!("already {}", order.status),
            });
        }

        let label = self
            .carrier
            .create_label(&LabelRequest {
                order_id,
                order_number: order.order_number.clone(),
                carrier: request.carrier.clone(),
                service_type: request.service_type.clone(),
                shipping_cost: request.shipping_cost,
                weight: request.weight,
                destination: order.shipping_address.clone(),
            })
            .await?;

        let shipment_number = self.sequence.next(EntityPrefix::Shipment).await?;
        let shipment = domain::Shipment {
            shipment_id: ShipmentId::new(),
            shipment_number: shipment_number.clone(),
            order_id,
            carrier: request.carrier.clone(),
            service_type: request.service_type.clone(),
            tracking_number: label.tracking_number.clone(),
            label_url: label.label_url.clone(),
            estimated_delivery: label.estimated_delivery,
            shipping_cost: request.shipping_cost,
            weight: request.weight,
            dimensions: request.dimensions.clone(),
            status: ShipmentStatus::LabelCreated,
            tracking_events: Vec::new(),
            delivered_at: None,
            created_by: actor,
        };

        let audit = AuditRecord::new(
            order_id,
            AuditOperation::Shipment,
            Some(order.snapshot()),
            Some(serde_json::json!({
                "shipment_number": shipment_number,
                "tracking_number": shipment.tracking_number,
                "status": OrderStatus::Shipped,
            })),
            actor,
        );
        self.store.record_shipment(&shipment, audit).await?;

        metrics::counter!("shipments_created_total").increment(1);
        tracing::info!(
            %order_id,
            shipment_number = %shipment_number,
            tracking_number = %shipment.tracking_number,
            carrier = %shipment.carrier,
            "shipping label created"
        );

        if let Ok(Some(updated)) = self.store.get_order(order_id).await {
            self.cache_best_effort(&updated).await;
        }

        Ok(LabelIssued {
            shipment_id: shipment.shipment_id,
            shipment_number,
            tracking_number: shipment.tracking_number,
            label_url: shipment.label_url,
            estimated_delivery: shipment.estimated_delivery,
        })
    }

    /// Polls carrier tracking and applies any status change.
    ///
    /// Idempotent: an unchanged carrier status writes nothing, duplicates no
    /// events, and re-fires no delivery side effects.
    #[tracing::instrument(skip(self))]
    pub async fn track_shipment(&self, tracking_number: &str) -> Result<TrackingReport> {
        let shipment = self
            .store
            .get_shipment_by_tracking(tracking_number)
            .await?
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(tracking_number.to_string()))?;

        let tracking = self.carrier.tracking(tracking_number).await?;

        let mut events = shipment.tracking_events;
        if tracking.status != shipment.status {
            let delivered_at =
                (tracking.status == ShipmentStatus::Delivered).then(Utc::now);
            let audit = AuditRecord::new(
                shipment.order_id,
                AuditOperation::Tracking,
                Some(serde_json::json!({"status": shipment.status})),
                Some(serde_json::json!({"status": tracking.status})),
                Uuid::nil(),
            );
            self.store
                .update_tracking(
                    tracking_number,
                    tracking.status,
                    &tracking.events,
                    delivered_at,
                    audit,
                )
                .await?;
            events = tracking.events;

            metrics::counter!("tracking_updates_total").increment(1);
            tracing::info!(
                tracking_number,
                status = %tracking.status,
                "shipment status updated"
            );

            if delivered_at.is_some() {
                // delivered → completed is an auto transition
                self.advance_best_effort(shipment.order_id, Uuid::nil()).await;
            }
        }

        let order = self.require_order(shipment.order_id).await?;
        Ok(TrackingReport {
            tracking_number: tracking_number.to_string(),
            status: tracking.status,
            events,
            estimated_delivery: shipment.estimated_delivery,
            order_number: order.order_number,
        })
    }

    /// Completes a manual stage with an external signal and continues
    /// automatic advancement.
    #[tracing::instrument(skip(self))]
    pub async fn signal(
        &self,
        order_id: OrderId,
        signal: StageSignal,
        actor: Uuid,
    ) -> Result<OrderRecord> {
        let order = self.require_order(order_id).await?;
        let expected = signal.completes();

        if order.workflow_stage != expected {
            return Err(FulfillmentError::Precondition {
                order_id,
                detail: format!(
                    "signal {signal} requires stage {expected}, order is at {}",
                    order.workflow_stage
                ),
            });
        }

        let rule = self
            .config
            .rule(order.workflow_kind, expected)
            .ok_or_else(|| FulfillmentError::Precondition {
                order_id,
                detail: format!(
                    "stage {expected} is not part of the {} workflow",
                    order.workflow_kind
                ),
            })?;

        let audit = Self::stage_audit(order_id, expected, rule.next, actor);
        self.store
            .advance_stage(order_id, expected, rule.next, rule.next.derived_status(), audit)
            .await?;
        tracing::info!(%order_id, signal = %signal, "manual stage completed");

        let order = self.run_advance(order_id, actor).await?;
        self.cache_best_effort(&order).await;
        Ok(order)
    }

    /// Cancels a not-yet-shipped order, releasing its reservations.
    ///
    /// If the order was already paid, the cancellation audit carries a
    /// refund-due marker; executing the refund is a separate concern.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        reason: &str,
        actor: Uuid,
    ) -> Result<()> {
        let order = self.require_order(order_id).await?;

        if !order.status.is_cancellable() {
            return Err(FulfillmentError::Precondition {
                order_id,
                detail: format!("not cancellable from status {}", order.status),
            });
        }

        let refund_due = order.payment_status == PaymentStatus::Completed;
        let audit = AuditRecord::new(
            order_id,
            AuditOperation::Cancel,
            Some(order.snapshot()),
            Some(serde_json::json!({
                "status": OrderStatus::Cancelled,
                "reason": reason,
                "refund_due": refund_due,
            })),
            actor,
        );
        self.store.cancel_order(order_id, audit).await?;
        self.cache.evict(order_id).await;

        metrics::counter!("orders_cancelled_total").increment(1);
        if refund_due {
            tracing::warn!(%order_id, "cancelled a paid order, refund obligation recorded");
        } else {
            tracing::info!(%order_id, reason, "order cancelled");
        }
        Ok(())
    }

    /// Re-runs automatic advancement for an order. Safe to call at any time:
    /// a fully advanced order is returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn retry_advance(&self, order_id: OrderId, actor: Uuid) -> Result<OrderRecord> {
        let order = self.run_advance(order_id, actor).await?;
        self.cache_best_effort(&order).await;
        Ok(order)
    }

    /// Orders whose post-commit advancement never reached a park point.
    pub async fn stalled_orders(&self) -> Result<Vec<OrderRecord>> {
        let candidates = self
            .store
            .orders_in_stages(&self.config.auto_stages())
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|o| {
                self.config
                    .next_auto(o.workflow_kind, o.workflow_stage)
                    .is_some()
            })
            .collect())
    }

    /// Loads an order, preferring the cache.
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderRecord> {
        if let Some(order) = self.cache.get(order_id).await {
            return Ok(order);
        }
        let order = self.require_order(order_id).await?;
        self.cache_best_effort(&order).await;
        Ok(order)
    }

    /// The audit trail of an order, oldest first.
    pub async fn audit_trail(&self, order_id: OrderId) -> Result<Vec<AuditRecord>> {
        self.require_order(order_id).await?;
        Ok(self.store.audit_trail(order_id).await?)
    }

    /// The line items of an order.
    pub async fn order_items(&self, order_id: OrderId) -> Result<Vec<domain::OrderItem>> {
        self.require_order(order_id).await?;
        Ok(self.store.get_items(order_id).await?)
    }

    /// Walks the order through consecutive auto transitions until it parks.
    ///
    /// Every step is a compare-and-swap in the store; losing a race to a
    /// concurrent worker just reloads and re-evaluates, so a transition can
    /// never be applied twice.
    async fn run_advance(&self, order_id: OrderId, actor: Uuid) -> Result<OrderRecord> {
        let mut order = self.require_order(order_id).await?;
        loop {
            let Some(rule) = self.config.rule(order.workflow_kind, order.workflow_stage) else {
                return Ok(order);
            };
            if !rule.auto {
                return Ok(order);
            }

            let audit = Self::stage_audit(order_id, order.workflow_stage, rule.next, actor);
            match self
                .store
                .advance_stage(
                    order_id,
                    order.workflow_stage,
                    rule.next,
                    rule.next.derived_status(),
                    audit,
                )
                .await
            {
                Ok(()) => {}
                Err(StoreError::StageConflict { .. }) => {
                    // lost the race; reload and re-evaluate
                }
                Err(e) => return Err(e.into()),
            }
            order = self.require_order(order_id).await?;
        }
    }

    async fn advance_best_effort(&self, order_id: OrderId, actor: Uuid) {
        match self.run_advance(order_id, actor).await {
            Ok(order) => self.cache_best_effort(&order).await,
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "post-commit advancement stalled");
                metrics::counter!("workflow_advance_failures_total").increment(1);
            }
        }
    }

    async fn cache_best_effort(&self, order: &OrderRecord) {
        if let Err(e) = self.cache.put(order).await {
            tracing::debug!(order_id = %order.order_id, error = %e, "order cache write failed");
        }
    }

    async fn require_order(&self, order_id: OrderId) -> Result<OrderRecord> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    fn stage_audit(
        order_id: OrderId,
        from: WorkflowStage,
        to: WorkflowStage,
        actor: Uuid,
    ) -> AuditRecord {
        AuditRecord::new(
            order_id,
            AuditOperation::Stage,
            Some(serde_json::json!({"workflow_stage": from})),
            Some(serde_json::json!({"workflow_stage": to})),
            actor,
        )
    }
}
