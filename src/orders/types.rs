//! Core order enums and identifiers.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side indicating buy or sell direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// P&L sign: +1 for Buy, -1 for Sell
    pub fn sign(&self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => -Decimal::ONE,
        }
    }

    /// Returns true if this is a buy order
    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type determining execution behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute immediately at best available price
    Market,
    /// Rest until price reaches the level
    Limit,
    /// Rest until price crosses the level, then go to market
    Stop,
    /// Stop that converts to a priced order on trigger
    StopLimit,
}

impl OrderType {
    /// Returns true if this order type requires a price
    pub fn requires_price(&self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// How an order relates to other orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContingencyType {
    /// Standalone order
    None,
    /// Child of a bracket (take-profit or stop-loss attached to a parent)
    Bracket,
    /// Member of an order group
    Group,
}

impl Default for ContingencyType {
    fn default() -> Self {
        ContingencyType::None
    }
}

impl fmt::Display for ContingencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContingencyType::None => write!(f, "NONE"),
            ContingencyType::Bracket => write!(f, "BRACKET"),
            ContingencyType::Group => write!(f, "GROUP"),
        }
    }
}

/// Order status in the lifecycle state machine.
///
/// Transitions only move forward:
/// ```text
/// Initialized ─┬→ Placed ─┬→ Filled → Closed
///              │          ├→ Canceled
///              │          └→ Rejected
///              ├→ Filled  (market orders fill at admission)
///              ├→ Canceled
///              └→ Rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created but not yet admitted
    Initialized,
    /// Admitted and resting in the active set
    Placed,
    /// Partially executed (live venues only; the simulator fills whole volumes)
    PartiallyFilled,
    /// Completely executed (terminal, may archive to Closed)
    Filled,
    /// Canceled before execution (terminal)
    Canceled,
    /// Archived after its position closed (terminal)
    Closed,
    /// Failed admission (terminal)
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Canceled | OrderStatus::Closed | OrderStatus::Rejected
        )
    }

    /// Returns true if the order is still working
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OrderStatus::Initialized | OrderStatus::Placed | OrderStatus::PartiallyFilled
        )
    }

    /// Returns true if the order can be canceled
    pub fn is_cancelable(&self) -> bool {
        self.is_open()
    }

    /// Check if a transition from this status to `target` is valid
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        match self {
            OrderStatus::Initialized => matches!(
                target,
                OrderStatus::Placed
                    | OrderStatus::Filled
                    | OrderStatus::Canceled
                    | OrderStatus::Rejected
            ),
            OrderStatus::Placed => matches!(
                target,
                OrderStatus::PartiallyFilled
                    | OrderStatus::Filled
                    | OrderStatus::Canceled
                    | OrderStatus::Rejected
            ),
            OrderStatus::PartiallyFilled => matches!(
                target,
                OrderStatus::PartiallyFilled | OrderStatus::Filled | OrderStatus::Canceled
            ),
            OrderStatus::Filled => matches!(target, OrderStatus::Closed),
            OrderStatus::Canceled | OrderStatus::Closed | OrderStatus::Rejected => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Initialized => write!(f, "INITIALIZED"),
            OrderStatus::Placed => write!(f, "PLACED"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::Closed => write!(f, "CLOSED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Order ID - unique within an account, caller-provided.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    /// Create an OrderId from an existing value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique OrderId
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
