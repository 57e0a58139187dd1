//! Order struct and builder.
//!
//! Orders carry their execution record and their bracket children; cycles
//! are avoided by referencing the instrument by name.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{ContingencyType, OrderId, OrderSide, OrderStatus, OrderType};

/// Execution record embedded in a filled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Instrument name the execution happened on
    pub symbol: String,
    /// Execution time
    pub time: DateTime<Utc>,
    /// Execution price
    pub price: Decimal,
    /// Executed volume
    pub volume: Decimal,
}

/// A trading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique id within the account, caller-provided
    pub id: OrderId,
    /// Instrument name
    pub symbol: String,
    /// Buy or sell
    pub side: OrderSide,
    /// Market, Limit, Stop, StopLimit
    pub order_type: OrderType,
    /// Standalone, bracket child, or group member
    pub contingency: ContingencyType,
    /// Quantity, always positive
    pub volume: Decimal,
    /// Level for non-market orders
    pub price: Option<Decimal>,
    /// Current lifecycle status
    pub status: OrderStatus,
    /// Admission time, set by the gateway
    pub time: Option<DateTime<Utc>>,
    /// Execution record, set on fill
    pub transaction: Option<Transaction>,
    /// Attached bracket children (take-profit, stop-loss)
    pub orders: Vec<Order>,
}

impl Order {
    /// Create a market order builder.
    pub fn market(symbol: impl Into<String>, side: OrderSide, volume: Decimal) -> OrderBuilder {
        OrderBuilder::new(OrderType::Market, symbol, side, volume)
    }

    /// Create a limit order builder.
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        volume: Decimal,
        price: Decimal,
    ) -> OrderBuilder {
        OrderBuilder::new(OrderType::Limit, symbol, side, volume).with_price(price)
    }

    /// Create a stop order builder.
    pub fn stop(
        symbol: impl Into<String>,
        side: OrderSide,
        volume: Decimal,
        price: Decimal,
    ) -> OrderBuilder {
        OrderBuilder::new(OrderType::Stop, symbol, side, volume).with_price(price)
    }

    /// Create a stop-limit order builder.
    pub fn stop_limit(
        symbol: impl Into<String>,
        side: OrderSide,
        volume: Decimal,
        price: Decimal,
    ) -> OrderBuilder {
        OrderBuilder::new(OrderType::StopLimit, symbol, side, volume).with_price(price)
    }

    /// Returns true if the order is still working.
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Returns true if the order executed completely.
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Apply a status change, enforcing the state machine.
    pub fn transition_to(&mut self, new_status: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(new_status) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: new_status,
                id: self.id.clone(),
            });
        }
        self.status = new_status;
        Ok(())
    }

    /// Record an execution and mark the order filled.
    pub fn fill(&mut self, price: Decimal, time: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition_to(OrderStatus::Filled)?;
        self.transaction = Some(Transaction {
            symbol: self.symbol.clone(),
            time,
            price,
            volume: self.volume,
        });
        Ok(())
    }

    /// Cancel the order if it is still cancelable.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.is_cancelable() {
            return Err(OrderError::NotCancelable {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.transition_to(OrderStatus::Canceled)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order({} {} {} {} @ {} status={})",
            self.id,
            self.side,
            self.order_type,
            self.symbol,
            self.price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "MARKET".to_string()),
            self.status,
        )
    }
}

/// Builder for constructing orders with admission validation.
#[derive(Debug)]
pub struct OrderBuilder {
    order_type: OrderType,
    symbol: String,
    side: OrderSide,
    volume: Decimal,
    price: Option<Decimal>,
    contingency: ContingencyType,
    id: Option<OrderId>,
    children: Vec<Order>,
}

impl OrderBuilder {
    /// Create a new order builder.
    pub fn new(
        order_type: OrderType,
        symbol: impl Into<String>,
        side: OrderSide,
        volume: Decimal,
    ) -> Self {
        Self {
            order_type,
            symbol: symbol.into(),
            side,
            volume,
            price: None,
            contingency: ContingencyType::None,
            id: None,
            children: Vec::new(),
        }
    }

    /// Set the price level.
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set a specific order id (otherwise generated).
    pub fn with_id(mut self, id: impl Into<OrderId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the contingency type.
    pub fn with_contingency(mut self, contingency: ContingencyType) -> Self {
        self.contingency = contingency;
        self
    }

    /// Attach a bracket child. The child inherits the parent's instrument
    /// at placement time and is marked as a bracket member.
    pub fn with_child(mut self, mut child: Order) -> Self {
        child.contingency = ContingencyType::Bracket;
        self.children.push(child);
        self
    }

    /// Validate and build the order.
    pub fn build(self) -> Result<Order, OrderError> {
        if self.symbol.trim().is_empty() {
            return Err(OrderError::MissingInstrument);
        }

        if self.volume <= Decimal::ZERO {
            return Err(OrderError::InvalidVolume {
                volume: self.volume,
            });
        }

        if self.order_type.requires_price() {
            match self.price {
                None => {
                    return Err(OrderError::MissingPrice {
                        order_type: self.order_type,
                    })
                }
                Some(price) if price <= Decimal::ZERO => {
                    return Err(OrderError::InvalidPrice { price })
                }
                Some(_) => {}
            }
        }

        Ok(Order {
            id: self.id.unwrap_or_else(OrderId::generate),
            symbol: self.symbol,
            side: self.side,
            order_type: self.order_type,
            contingency: self.contingency,
            volume: self.volume,
            price: self.price,
            status: OrderStatus::Initialized,
            time: None,
            transaction: None,
            orders: self.children,
        })
    }
}

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid state transition from {from} to {to} for order {id}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        id: OrderId,
    },

    #[error("Order requires an instrument")]
    MissingInstrument,

    #[error("Invalid volume {volume}: must be positive")]
    InvalidVolume { volume: Decimal },

    #[error("{order_type} order requires a price")]
    MissingPrice { order_type: OrderType },

    #[error("Invalid price {price}: must be positive")]
    InvalidPrice { price: Decimal },

    #[error("Order {id} cannot be canceled in status {status}")]
    NotCancelable { id: OrderId, status: OrderStatus },

    #[error("Duplicate order id: {0}")]
    DuplicateId(OrderId),

    #[error("Order not found: {0}")]
    NotFound(OrderId),
}
