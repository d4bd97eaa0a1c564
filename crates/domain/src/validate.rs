//! Fail-fast order validation.
//!
//! Checks a proposed order payload before any transaction opens and returns
//! either a normalized [`OrderDraft`] or the full list of field-level
//! problems. Never mutates state.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::order::{Address, OrderItem, OrderType, Priority};
use crate::workflow::WorkflowKind;

/// Incoming order payload as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub customer_id: Uuid,
    #[serde(default)]
    pub sales_rep_id: Option<Uuid>,
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub required_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<u32>,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub subtotal_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub shipping_cents: i64,
    pub total_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub workflow_type: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// One proposed line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub discount_percent: u32,
    #[serde(default)]
    pub tax_rate: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All validation problems found in a payload.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order validation failed: ")?;
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// A validated, normalized order payload with defaults applied.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub customer_id: CustomerId,
    pub sales_rep_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub order_date: Option<DateTime<Utc>>,
    pub required_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub order_type: OrderType,
    pub source: String,
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
    pub workflow_kind: WorkflowKind,
    pub items: Vec<OrderItem>,
}

/// Validates a proposed order, returning the normalized draft or every
/// problem found.
pub fn validate_order(req: &NewOrderRequest) -> Result<OrderDraft, ValidationError> {
    let mut errors = Vec::new();

    let priority = parse_enum::<Priority>(req.priority.as_deref(), "priority", &mut errors);
    let order_type = parse_enum::<OrderType>(req.order_type.as_deref(), "order_type", &mut errors);
    let workflow_kind =
        parse_enum::<WorkflowKind>(req.workflow_type.as_deref(), "workflow_type", &mut errors);

    for (field, cents) in [
        ("subtotal", req.subtotal_cents),
        ("discount_amount", req.discount_cents),
        ("tax_amount", req.tax_cents),
        ("shipping_amount", req.shipping_cents),
        ("total_amount", req.total_cents),
    ] {
        if cents < 0 {
            errors.push(FieldError::new(field, "must not be negative"));
        }
    }

    let subtotal = Money::from_cents(req.subtotal_cents);
    let discount = Money::from_cents(req.discount_cents);
    let tax = Money::from_cents(req.tax_cents);
    let shipping = Money::from_cents(req.shipping_cents);
    let total = Money::from_cents(req.total_cents);

    let computed = subtotal - discount + tax + shipping;
    if total != computed {
        errors.push(FieldError::new(
            "total_amount",
            format!(
                "must equal subtotal - discount + tax + shipping ({} != {})",
                total, computed
            ),
        ));
    }

    let currency = req.currency.clone().unwrap_or_else(|| "INR".to_string());
    if currency.len() != 3 {
        errors.push(FieldError::new("currency", "must be a 3-letter code"));
    }

    if req.items.is_empty() {
        errors.push(FieldError::new("items", "at least one item is required"));
    }

    let mut items = Vec::with_capacity(req.items.len());
    for (i, item) in req.items.iter().enumerate() {
        if item.quantity < 1 {
            errors.push(FieldError::new(
                format!("items[{i}].quantity"),
                "must be at least 1",
            ));
        }
        if item.unit_price_cents < 0 {
            errors.push(FieldError::new(
                format!("items[{i}].unit_price_cents"),
                "must not be negative",
            ));
        }
        if item.discount_percent > 100 {
            errors.push(FieldError::new(
                format!("items[{i}].discount_percent"),
                "must be at most 100",
            ));
        }
        items.push(OrderItem {
            product_id: ProductId::from_uuid(item.product_id),
            quantity: item.quantity,
            unit_price: Money::from_cents(item.unit_price_cents),
            discount_percent: item.discount_percent,
            tax_rate: item.tax_rate,
            notes: item.notes.clone(),
        });
    }

    if !errors.is_empty() {
        return Err(ValidationError { errors });
    }

    Ok(OrderDraft {
        customer_id: CustomerId::from_uuid(req.customer_id),
        sales_rep_id: req.sales_rep_id,
        agent_id: req.agent_id,
        order_date: req.order_date,
        required_date: req.required_date,
        priority,
        order_type,
        source: req.source.clone().unwrap_or_else(|| "manual".to_string()),
        payment_terms: req.payment_terms.unwrap_or(30),
        payment_method: req.payment_method.clone(),
        subtotal,
        discount_amount: discount,
        tax_amount: tax,
        shipping_amount: shipping,
        total_amount: total,
        currency,
        shipping_address: req.shipping_address.clone(),
        billing_address: req.billing_address.clone(),
        special_instructions: req.special_instructions.clone(),
        workflow_kind,
        items,
    })
}

fn parse_enum<T: std::str::FromStr + Default>(
    value: Option<&str>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> T
where
    T::Err: std::fmt::Display,
{
    match value {
        None => T::default(),
        Some(s) => match s.parse() {
            Ok(v) => v,
            Err(e) => {
                errors.push(FieldError::new(field, e.to_string()));
                T::default()
            }
        },
    }
}
