//! PostgreSQL-backed order store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId, ShipmentId, TransactionId};
use domain::{
    AuditRecord, OrderItem, OrderRecord, OrderStatus, PaymentTransaction, Shipment,
    ShipmentStatus, TrackingEvent, WorkflowStage,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::{OrderStore, StockLevel};

/// Order store backed by PostgreSQL via sqlx.
///
/// Each trait method runs inside one database transaction; dropping the
/// transaction on an error path rolls back every statement issued so far.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<OrderRecord> {
        let shipping_address: Option<serde_json::Value> = row.try_get("shipping_address")?;
        let billing_address: Option<serde_json::Value> = row.try_get("billing_address")?;

        Ok(OrderRecord {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: row.try_get("order_number")?,
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            sales_rep_id: row.try_get("sales_rep_id")?,
            agent_id: row.try_get("agent_id")?,
            order_date: row.try_get("order_date")?,
            required_date: row.try_get("required_date")?,
            priority: row.try_get::<String, _>("priority")?.parse()?,
            order_type: row.try_get::<String, _>("order_type")?.parse()?,
            source: row.try_get("source")?,
            payment_terms: row.try_get::<i32, _>("payment_terms")? as u32,
            payment_method: row.try_get("payment_method")?,
            subtotal: Money::from_cents(row.try_get("subtotal")?),
            discount_amount: Money::from_cents(row.try_get("discount_amount")?),
            tax_amount: Money::from_cents(row.try_get("tax_amount")?),
            shipping_amount: Money::from_cents(row.try_get("shipping_amount")?),
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            currency: row.try_get("currency")?,
            shipping_address: shipping_address.map(serde_json::from_value).transpose()?,
            billing_address: billing_address.map(serde_json::from_value).transpose()?,
            special_instructions: row.try_get("special_instructions")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            workflow_kind: row.try_get::<String, _>("workflow_kind")?.parse()?,
            workflow_stage: row.try_get::<String, _>("workflow_stage")?.parse()?,
            payment_status: row.try_get::<String, _>("payment_status")?.parse()?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            shipped_at: row.try_get("shipped_at")?,
            delivered_at: row.try_get("delivered_at")?,
        })
    }

    fn row_to_shipment(row: PgRow) -> Result<Shipment> {
        let events: serde_json::Value = row.try_get("tracking_events")?;

        Ok(Shipment {
            shipment_id: ShipmentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            shipment_number: row.try_get("shipment_number")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            carrier: row.try_get("carrier")?,
            service_type: row.try_get("service_type")?,
            tracking_number: row.try_get("tracking_number")?,
            label_url: row.try_get("label_url")?,
            estimated_delivery: row.try_get("estimated_delivery")?,
            shipping_cost: Money::from_cents(row.try_get("shipping_cost")?),
            weight: row.try_get("weight")?,
            dimensions: row.try_get("dimensions")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            tracking_events: serde_json::from_value(events)?,
            delivered_at: row.try_get("delivered_at")?,
            created_by: row.try_get("created_by")?,
        })
    }

    async fn insert_audit(
        tx: &mut Transaction<'_, Postgres>,
        audit: &AuditRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_audit (order_id, operation, before_state, after_state, actor, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(audit.order_id.as_uuid())
        .bind(audit.operation.as_str())
        .bind(&audit.before)
        .bind(&audit.after)
        .bind(audit.actor)
        .bind(audit.recorded_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order(
        &self,
        order: &OrderRecord,
        items: &[OrderItem],
        audit: AuditRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, customer_id, sales_rep_id, agent_id,
                order_date, required_date, priority, order_type, source,
                payment_terms, payment_method, subtotal, discount_amount,
                tax_amount, shipping_amount, total_amount, currency,
                shipping_address, billing_address, special_instructions,
                status, workflow_kind, workflow_stage, payment_status,
                created_by, created_at, updated_at, shipped_at, delivered_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26, $27, $28, $29, $30
            )
            "#,
        )
        .bind(order.order_id.as_uuid())
        .bind(&order.order_number)
        .bind(order.customer_id.as_uuid())
        .bind(order.sales_rep_id)
        .bind(order.agent_id)
        .bind(order.order_date)
        .bind(order.required_date)
        .bind(order.priority.as_str())
        .bind(order.order_type.as_str())
        .bind(&order.source)
        .bind(order.payment_terms as i32)
        .bind(&order.payment_method)
        .bind(order.subtotal.cents())
        .bind(order.discount_amount.cents())
        .bind(order.tax_amount.cents())
        .bind(order.shipping_amount.cents())
        .bind(order.total_amount.cents())
        .bind(&order.currency)
        .bind(
            order
                .shipping_address
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(
            order
                .billing_address
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&order.special_instructions)
        .bind(order.status.as_str())
        .bind(order.workflow_kind.as_str())
        .bind(order.workflow_stage.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.created_by)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, line_no, product_id, quantity, unit_price,
                    discount_percent, tax_rate, notes
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.order_id.as_uuid())
            .bind(line_no as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.quantity as i32)
            .bind(item.unit_price.cents())
            .bind(item.discount_percent as i32)
            .bind(item.tax_rate as i32)
            .bind(&item.notes)
            .execute(&mut *tx)
            .await?;

            // Guarded reservation: matches only when enough stock remains.
            let reserved = sqlx::query(
                r#"
                UPDATE stock_levels
                SET reserved = reserved + $2
                WHERE product_id = $1 AND on_hand - reserved >= $2
                "#,
            )
            .bind(item.product_id.as_uuid())
            .bind(item.quantity as i32)
            .execute(&mut *tx)
            .await?;

            if reserved.rows_affected() == 0 {
                let available: Option<(i32, i32)> = sqlx::query_as(
                    "SELECT on_hand, reserved FROM stock_levels WHERE product_id = $1",
                )
                .bind(item.product_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

                // Dropping the transaction rolls back the inserts above.
                return Err(StoreError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: available
                        .map(|(on_hand, reserved)| (on_hand - reserved).max(0) as u32)
                        .unwrap_or(0),
                });
            }
        }

        Self::insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        tracing::debug!(order_id = %order.order_id, items = items.len(), "order persisted");
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity, unit_price, discount_percent, tax_rate, notes
            FROM order_items
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderItem {
                    product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                    quantity: row.try_get::<i32, _>("quantity")? as u32,
                    unit_price: Money::from_cents(row.try_get("unit_price")?),
                    discount_percent: row.try_get::<i32, _>("discount_percent")? as u32,
                    tax_rate: row.try_get::<i32, _>("tax_rate")? as u32,
                    notes: row.try_get("notes")?,
                })
            })
            .collect()
    }

    async fn advance_stage(
        &self,
        order_id: OrderId,
        from: WorkflowStage,
        to: WorkflowStage,
        status: Option<OrderStatus>,
        audit: AuditRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET workflow_stage = $3,
                status = COALESCE($4, status),
                updated_at = $5
            WHERE id = $1 AND workflow_stage = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(status.map(|s| s.as_str()))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let actual: Option<String> =
                sqlx::query_scalar("SELECT workflow_stage FROM orders WHERE id = $1")
                    .bind(order_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            return match actual {
                None => Err(StoreError::OrderNotFound(order_id)),
                Some(stage) => Err(StoreError::StageConflict {
                    order_id,
                    expected: from,
                    actual: stage.parse()?,
                }),
            };
        }

        Self::insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_payment(&self, txn: &PaymentTransaction, audit: AuditRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = 'completed',
                workflow_stage = 'payment_completed',
                updated_at = $2
            WHERE id = $1 AND payment_status = 'pending'
            "#,
        )
        .bind(txn.order_id.as_uuid())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM orders WHERE id = $1")
                .bind(txn.order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
            return match exists {
                None => Err(StoreError::OrderNotFound(txn.order_id)),
                Some(_) => Err(StoreError::UpdateConflict(txn.order_id)),
            };
        }

        sqlx::query(
            r#"
            INSERT INTO payment_transactions (
                id, transaction_number, order_id, customer_id, payment_method,
                gateway, gateway_transaction_id, amount, currency, status,
                processed_at, gateway_response, net_amount, created_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(txn.transaction_id.as_uuid())
        .bind(&txn.transaction_number)
        .bind(txn.order_id.as_uuid())
        .bind(txn.customer_id.as_uuid())
        .bind(&txn.payment_method)
        .bind(&txn.gateway)
        .bind(&txn.gateway_transaction_id)
        .bind(txn.amount.cents())
        .bind(&txn.currency)
        .bind(txn.status.as_str())
        .bind(txn.processed_at)
        .bind(&txn.gateway_response)
        .bind(txn.net_amount.cents())
        .bind(txn.created_by)
        .execute(&mut *tx)
        .await?;

        Self::insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_payment(&self, order_id: OrderId) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query("SELECT * FROM payment_transactions WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(PaymentTransaction {
                transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
                transaction_number: row.try_get("transaction_number")?,
                order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
                payment_method: row.try_get("payment_method")?,
                gateway: row.try_get("gateway")?,
                gateway_transaction_id: row.try_get("gateway_transaction_id")?,
                amount: Money::from_cents(row.try_get("amount")?),
                currency: row.try_get("currency")?,
                status: row.try_get::<String, _>("status")?.parse()?,
                processed_at: row.try_get("processed_at")?,
                gateway_response: row.try_get("gateway_response")?,
                net_amount: Money::from_cents(row.try_get("net_amount")?),
                created_by: row.try_get("created_by")?,
            })
        })
        .transpose()
    }

    async fn record_shipment(&self, shipment: &Shipment, audit: AuditRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'shipped',
                workflow_stage = 'shipped',
                shipped_at = $2,
                updated_at = $2
            WHERE id = $1
              AND status NOT IN ('shipped', 'delivered', 'completed', 'cancelled')
            "#,
        )
        .bind(shipment.order_id.as_uuid())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM orders WHERE id = $1")
                .bind(shipment.order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
            return match exists {
                None => Err(StoreError::OrderNotFound(shipment.order_id)),
                Some(_) => Err(StoreError::UpdateConflict(shipment.order_id)),
            };
        }

        sqlx::query(
            r#"
            INSERT INTO shipments (
                id, shipment_number, order_id, carrier, service_type,
                tracking_number, label_url, estimated_delivery, shipping_cost,
                weight, dimensions, status, tracking_events, delivered_at,
                created_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(shipment.shipment_id.as_uuid())
        .bind(&shipment.shipment_number)
        .bind(shipment.order_id.as_uuid())
        .bind(&shipment.carrier)
        .bind(&shipment.service_type)
        .bind(&shipment.tracking_number)
        .bind(&shipment.label_url)
        .bind(shipment.estimated_delivery)
        .bind(shipment.shipping_cost.cents())
        .bind(shipment.weight)
        .bind(&shipment.dimensions)
        .bind(shipment.status.as_str())
        .bind(serde_json::to_value(&shipment.tracking_events)?)
        .bind(shipment.delivered_at)
        .bind(shipment.created_by)
        .execute(&mut *tx)
        .await?;

        Self::insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_shipment_by_tracking(&self, tracking_number: &str) -> Result<Option<Shipment>> {
        let row = sqlx::query("SELECT * FROM shipments WHERE tracking_number = $1")
            .bind(tracking_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_shipment).transpose()
    }

    async fn update_tracking(
        &self,
        tracking_number: &str,
        status: ShipmentStatus,
        events: &[TrackingEvent],
        delivered_at: Option<DateTime<Utc>>,
        audit: AuditRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let order_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE shipments
            SET status = $2, tracking_events = $3, delivered_at = $4
            WHERE tracking_number = $1
            RETURNING order_id
            "#,
        )
        .bind(tracking_number)
        .bind(status.as_str())
        .bind(serde_json::to_value(events)?)
        .bind(delivered_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = order_id else {
            return Err(StoreError::ShipmentNotFound(tracking_number.to_string()));
        };

        if let Some(at) = delivered_at {
            sqlx::query(
                r#"
                UPDATE orders
                SET status = 'delivered',
                    workflow_stage = 'delivered',
                    delivered_at = $2,
                    updated_at = $2
                WHERE id = $1
                "#,
            )
            .bind(order_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        }

        Self::insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cancel_order(&self, order_id: OrderId, audit: AuditRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let status: OrderStatus = status
            .ok_or(StoreError::OrderNotFound(order_id))?
            .parse()?;
        if !status.is_cancellable() {
            return Err(StoreError::NotCancellable { order_id, status });
        }

        sqlx::query(
            r#"
            UPDATE stock_levels s
            SET reserved = GREATEST(s.reserved - i.quantity, 0)
            FROM order_items i
            WHERE i.order_id = $1 AND i.product_id = s.product_id
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'cancelled', workflow_stage = 'cancelled', updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        Self::insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn audit_trail(&self, order_id: OrderId) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, operation, before_state, after_state, actor, recorded_at
            FROM order_audit
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AuditRecord {
                    order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
                    operation: row.try_get::<String, _>("operation")?.parse()?,
                    before: row.try_get("before_state")?,
                    after: row.try_get("after_state")?,
                    actor: row.try_get("actor")?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    async fn orders_in_stages(&self, stages: &[WorkflowStage]) -> Result<Vec<OrderRecord>> {
        let names: Vec<String> = stages.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query("SELECT * FROM orders WHERE workflow_stage = ANY($1)")
            .bind(names)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn set_stock(&self, product_id: ProductId, on_hand: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, on_hand, reserved)
            VALUES ($1, $2, 0)
            ON CONFLICT (product_id) DO UPDATE SET on_hand = EXCLUDED.on_hand
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(on_hand as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stock_level(&self, product_id: ProductId) -> Result<Option<StockLevel>> {
        let row: Option<(i32, i32)> =
            sqlx::query_as("SELECT on_hand, reserved FROM stock_levels WHERE product_id = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(on_hand, reserved)| StockLevel {
            on_hand: on_hand.max(0) as u32,
            reserved: reserved.max(0) as u32,
        }))
    }
}
