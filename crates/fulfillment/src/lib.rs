//! Order fulfillment engine.
//!
//! Drives orders through a staged workflow: creation with atomic inventory
//! reservation, manual approval and warehouse signals, exact-amount payment
//! through a gateway abstraction, shipping-label issuance through a carrier
//! abstraction, and idempotent tracking updates through to delivery.

pub mod cache;
pub mod carrier;
pub mod error;
pub mod gateway;
pub mod processor;
pub mod sequence;

pub use cache::OrderCache;
pub use carrier::{
    CarrierApi, CarrierError, CarrierLabel, CarrierTracking, InMemoryCarrier, LabelRequest,
};
pub use error::{FulfillmentError, Result};
pub use gateway::{ChargeRequest, GatewayCharge, GatewayError, InMemoryGateway, PaymentGateway};
pub use processor::{
    LabelIssued, OrderCreated, OrderProcessor, PaymentReceipt, PaymentRequest, ShippingRequest,
    TrackingReport,
};
pub use sequence::{EntityPrefix, SequenceGenerator};
