pub mod ids;
pub mod money;

pub use ids::{CustomerId, OrderId, ProductId, ShipmentId, TransactionId};
pub use money::Money;
