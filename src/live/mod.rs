//! Live broker adapter skeleton.
//!
//! Every live adapter follows the same shape: an authenticated session (see
//! [`crate::socket`]), a mapper that translates wire messages to the core's
//! [`Point`]/[`Order`] model, and the same event streams the simulator
//! feeds. Concrete broker wire formats plug in through [`WireMapper`];
//! translation keeps every field the core requires and drops unknown ones.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::data::Point;
use crate::error::{GatewayError, GatewayResult};
use crate::orders::{Order, OrderId};
use crate::socket::{MessageCallback, SocketSession};
use crate::stream::{EventStream, StreamAction, StreamEvent};

/// One decoded inbound wire message.
#[derive(Debug, Clone)]
pub enum WireEvent {
    /// A market data tick
    Point(Point),
    /// An order state report
    Order(Order),
    /// Keepalive, nothing to publish
    Heartbeat,
    /// Message kinds the core does not consume
    Ignored,
}

/// Translates between a broker's wire format and the core model.
pub trait WireMapper: Send + Sync {
    /// Decode one inbound message.
    fn decode(&self, text: &str) -> GatewayResult<WireEvent>;

    /// Encode an outbound order submission.
    fn encode_order(&self, order: &Order) -> GatewayResult<String>;
}

/// Write the broker-assigned id back onto a submitted order.
pub fn reconcile_order_id(order: &mut Order, broker_id: &str) {
    order.id = OrderId::new(broker_id);
}

/// Pumps a socket session through a mapper onto the core streams.
///
/// Parse failures are emitted on the error stream and the feed keeps going;
/// connection failures end the run and are returned to the caller.
pub struct LiveFeed {
    mapper: Arc<dyn WireMapper>,
    points: EventStream<Point>,
    orders: EventStream<Order>,
    errors: EventStream<GatewayError>,
}

impl LiveFeed {
    /// Create a feed around a broker mapper.
    pub fn new(mapper: Arc<dyn WireMapper>) -> Self {
        Self {
            mapper,
            points: EventStream::new(),
            orders: EventStream::new(),
            errors: EventStream::new(),
        }
    }

    /// Stream of decoded ticks.
    pub fn point_stream(&self) -> EventStream<Point> {
        self.points.clone()
    }

    /// Stream of decoded order reports.
    pub fn order_stream(&self) -> EventStream<Order> {
        self.orders.clone()
    }

    /// Stream of decode and transport failures.
    pub fn error_stream(&self) -> EventStream<GatewayError> {
        self.errors.clone()
    }

    /// Build the session callback that decodes and publishes.
    pub fn callback(&self) -> MessageCallback {
        let mapper = Arc::clone(&self.mapper);
        let points = self.points.clone();
        let orders = self.orders.clone();
        let errors = self.errors.clone();
        Arc::new(move |text: String| match mapper.decode(&text) {
            Ok(WireEvent::Point(point)) => points.publish(StreamEvent::create(point)),
            Ok(WireEvent::Order(order)) => orders.publish(StreamEvent {
                action: StreamAction::Update,
                previous: None,
                next: order,
            }),
            Ok(WireEvent::Heartbeat) | Ok(WireEvent::Ignored) => {}
            Err(error) => {
                debug!(%error, "dropping undecodable wire message");
                errors.publish(StreamEvent::create(error));
            }
        })
    }

    /// Drive a session until shutdown.
    pub async fn run(
        &self,
        session: &SocketSession,
        shutdown: broadcast::Receiver<()>,
    ) -> GatewayResult<()> {
        session.run(self.callback(), shutdown).await
    }
}
