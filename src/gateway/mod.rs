//! The broker gateway contract.
//!
//! Every adapter, the simulator and each live broker alike, implements
//! [`Gateway`]. Strategy code is written against this trait only, so it runs
//! identically against replayed files and live sockets. Adapters never panic
//! or return raw errors across the boundary: synchronous calls answer with a
//! [`Response`] envelope, background loops emit on the error stream.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::account::{Account, Position};
use crate::data::{Instrument, Point};
use crate::error::GatewayError;
use crate::orders::Order;
use crate::stream::EventStream;

/// Query filter for account and market data reads.
pub type Criteria = HashMap<String, String>;

/// One failure inside a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorItem {
    /// Adapter-specific code, when the wire provides one
    pub code: Option<i32>,
    /// Human-readable message
    pub message: String,
}

impl ErrorItem {
    /// Create an error item from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create an error item with an adapter code.
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Response envelope for gateway calls.
///
/// A success carries data and no errors; any failure is listed in `errors`
/// instead of unwinding across the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response<T> {
    /// Payload, present on success
    pub data: Option<T>,
    /// Failures captured at the boundary
    pub errors: Vec<ErrorItem>,
}

impl<T> Response<T> {
    /// A successful response.
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// A failed response with one message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: vec![ErrorItem::new(message)],
        }
    }

    /// A failed response for an unsupported query.
    pub fn not_implemented(query: &str) -> Self {
        Self::from_error(&GatewayError::not_implemented(query))
    }

    /// Wrap a gateway error.
    pub fn from_error(error: &GatewayError) -> Self {
        Self::fail(error.to_string())
    }

    /// True when the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.data.is_some()
    }

    /// Payload reference, when present.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }
}

/// Connection state of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// Not connected
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Connected and ready
    Connected,
}

impl ConnectionStatus {
    /// Returns true if the adapter is ready for operations.
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Disconnected
    }
}

/// Top-of-book depth snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dom {
    /// Bid side, best first
    pub bids: Vec<Point>,
    /// Ask side, best first
    pub asks: Vec<Point>,
}

/// Uniform broker-facing interface.
///
/// Read-only queries default to a not-implemented envelope so adapters only
/// override what their venue supports.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Connect the adapter. Idempotent: internally disconnects first.
    async fn connect(&mut self) -> Response<ConnectionStatus>;

    /// Release all subscriptions and sockets. Safe on an already
    /// disconnected adapter.
    async fn disconnect(&mut self) -> Response<ConnectionStatus>;

    /// Add an instrument to the active feed.
    async fn subscribe(&mut self, instrument: Instrument) -> Response<()>;

    /// Remove an instrument from the active feed.
    async fn unsubscribe(&mut self, name: &str) -> Response<()>;

    /// Refresh balance, orders, and positions from the authoritative source.
    async fn get_account(&mut self, criteria: Criteria) -> Response<Account>;

    /// Submit orders. Per-order failures are reported in the envelope.
    async fn create_orders(&mut self, orders: Vec<Order>) -> Response<Vec<Order>>;

    /// Cancel orders. Cancelling an already-terminal order is a no-op.
    async fn delete_orders(&mut self, orders: Vec<Order>) -> Response<Vec<Order>>;

    /// Historical points for an instrument.
    async fn get_points(&self, _criteria: Criteria) -> Response<Vec<Point>> {
        Response::not_implemented("get_points")
    }

    /// Current depth of market.
    async fn get_dom(&self, _criteria: Criteria) -> Response<Dom> {
        Response::not_implemented("get_dom")
    }

    /// Option chain for an underlying.
    async fn get_options(&self, _criteria: Criteria) -> Response<Vec<Instrument>> {
        Response::not_implemented("get_options")
    }

    /// Positions, historical and active.
    async fn get_positions(&self, _criteria: Criteria) -> Response<Vec<Position>> {
        Response::not_implemented("get_positions")
    }

    /// Working orders.
    async fn get_orders(&self, _criteria: Criteria) -> Response<Vec<Order>> {
        Response::not_implemented("get_orders")
    }

    /// Stream of tick appends.
    fn point_stream(&self) -> EventStream<Point>;

    /// Stream of order lifecycle events.
    fn order_stream(&self) -> EventStream<Order>;

    /// Stream of position deltas.
    fn position_stream(&self) -> EventStream<Position>;

    /// Stream of background failures.
    fn error_stream(&self) -> EventStream<GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success() {
        let response = Response::ok(42);
        assert!(response.is_ok());
        assert_eq!(response.data(), Some(&42));
    }

    #[test]
    fn test_response_failure() {
        let response: Response<()> = Response::fail("boom");
        assert!(!response.is_ok());
        assert_eq!(response.errors.len(), 1);
        assert!(response.data.is_none());
    }

    #[test]
    fn test_not_implemented_envelope() {
        let response: Response<Dom> = Response::not_implemented("get_dom");
        assert!(!response.is_ok());
        assert!(response.errors[0].message.contains("get_dom"));
    }

    #[test]
    fn test_error_item_display() {
        assert_eq!(ErrorItem::new("bad").to_string(), "bad");
        assert_eq!(ErrorItem::with_code(-7, "bad").to_string(), "[-7] bad");
    }

    // Compile-time check that the trait stays object safe.
    fn _assert_send_sync<T: Send + Sync>() {}

    fn _check_trait_bounds() {
        _assert_send_sync::<Box<dyn Gateway>>();
    }
}
