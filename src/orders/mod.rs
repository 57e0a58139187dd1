//! Order model: sides, types, lifecycle, and the order struct itself.

mod order;
mod types;

pub use order::{Order, OrderBuilder, OrderError, Transaction};
pub use types::{ContingencyType, OrderId, OrderSide, OrderStatus, OrderType};
