//! Simulated matching gateway.
//!
//! Replays merged tick files on a virtual clock and matches orders against
//! the replayed top-of-book. Account mutation and matching are serialized:
//! the feed scheduler enqueues points, a single engine task drains them
//! FIFO, and user calls lock the same account mutex. No critical section
//! yields between reading an order and emitting the updated account.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::account::{Account, Position};
use crate::config::CoreConfig;
use crate::data::{Instrument, Point};
use crate::error::GatewayError;
use crate::feed::{FeedScheduler, FileTickSource, TickMerge, TickSource};
use crate::gateway::{ConnectionStatus, Criteria, Dom, ErrorItem, Gateway, Response};
use crate::orders::{Order, OrderId, OrderSide, OrderStatus, OrderType};
use crate::stream::{EventStream, StreamEvent};

/// How long `disconnect` waits for background loops before aborting them.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Outbound streams shared between the engine task and the gateway handle.
#[derive(Clone)]
struct SimStreams {
    points: EventStream<Point>,
    orders: EventStream<Order>,
    positions: EventStream<Position>,
    errors: EventStream<GatewayError>,
}

impl SimStreams {
    fn new() -> Self {
        Self {
            points: EventStream::new(),
            orders: EventStream::new(),
            positions: EventStream::new(),
            errors: EventStream::new(),
        }
    }
}

/// The simulator: a [`Gateway`] backed by tick files and an in-memory
/// account.
pub struct SimGateway {
    config: CoreConfig,
    account: Arc<Mutex<Account>>,
    streams: SimStreams,
    status: ConnectionStatus,
    disconnect_tx: Option<broadcast::Sender<()>>,
    feed_tasks: Vec<JoinHandle<()>>,
}

impl SimGateway {
    /// Create a simulator from configuration.
    pub fn new(config: CoreConfig) -> Self {
        let account = Account::new(config.descriptor.clone(), config.initial_balance);
        Self {
            config,
            account: Arc::new(Mutex::new(account)),
            streams: SimStreams::new(),
            status: ConnectionStatus::Disconnected,
            disconnect_tx: None,
            feed_tasks: Vec::new(),
        }
    }

    /// Current connection state.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Number of live background loops; zero once disconnected.
    pub fn active_feed_tasks(&self) -> usize {
        self.feed_tasks.len()
    }

    /// Run a closure against the account under the engine lock.
    pub fn with_account<R>(&self, f: impl FnOnce(&Account) -> R) -> R {
        f(&self.account.lock())
    }

    /// Feed one point directly through the matching engine.
    ///
    /// The scheduler uses the same path; tests and synthetic feeds can
    /// inject ticks without files.
    pub fn process_point(&self, point: Point) {
        if let Err(error) = Self::on_point(&self.account, &self.streams, point) {
            self.streams.errors.publish(StreamEvent::create(error));
        }
    }

    fn market_price(side: OrderSide, point: &Point) -> Option<Decimal> {
        match side {
            OrderSide::Buy => point.ask,
            OrderSide::Sell => point.bid,
        }
    }

    /// Resting-order trigger rule on a fresh tick.
    fn is_triggered(order: &Order, point: &Point) -> bool {
        let Some(level) = order.price else {
            return false;
        };
        match (order.side, order.order_type) {
            (OrderSide::Buy, OrderType::Stop | OrderType::StopLimit)
            | (OrderSide::Sell, OrderType::Limit) => {
                point.ask.map(|ask| ask >= level).unwrap_or(false)
            }
            (OrderSide::Sell, OrderType::Stop | OrderType::StopLimit)
            | (OrderSide::Buy, OrderType::Limit) => {
                point.bid.map(|bid| bid <= level).unwrap_or(false)
            }
            (_, OrderType::Market) => false,
        }
    }

    /// One tick through the engine: append, evaluate resting orders, mark.
    fn on_point(
        account: &Mutex<Account>,
        streams: &SimStreams,
        point: Point,
    ) -> Result<(), GatewayError> {
        let mut account = account.lock();

        // Unsubscribed mid-session: the source is drained but its ticks no
        // longer reach the engine.
        if !account.instruments.contains_key(&point.symbol) {
            return Ok(());
        }

        let action = account.ensure_instrument(&point.symbol).append(point.clone());
        streams.points.publish(StreamEvent {
            action,
            previous: None,
            next: point.clone(),
        });

        // Collect triggered resting orders in a deterministic sequence.
        let mut triggered: Vec<(Option<DateTime<Utc>>, OrderId)> = Vec::new();
        for order in account.active_orders.values() {
            if order.symbol.is_empty() {
                return Err(GatewayError::Invariant(format!(
                    "active order {} has no instrument",
                    order.id
                )));
            }
            if order.symbol == point.symbol
                && order.status == OrderStatus::Placed
                && Self::is_triggered(order, &point)
            {
                triggered.push((order.time, order.id.clone()));
            }
        }
        triggered.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_str().cmp(b.1.as_str())));

        for (_, id) in triggered {
            let Some(mut order) = account.active_orders.remove(&id) else {
                // Cancelled as a sibling bracket earlier in this same tick.
                continue;
            };
            let Some(price) = Self::market_price(order.side, &point) else {
                account.active_orders.insert(id, order);
                continue;
            };
            let placed = order.clone();
            order
                .fill(price, point.time)
                .map_err(|e| GatewayError::Invariant(e.to_string()))?;
            account.archive_order(order.clone());
            streams.orders.publish(StreamEvent::update(placed, order.clone()));
            Self::settle_fill(&mut account, streams, &order, price, point.time);
        }

        // Mark-to-market the active position; balance untouched.
        if let Some(last) = point.last {
            let contract_size = account.contract_size(&point.symbol);
            if let Some(position) = account.active_positions.get_mut(&point.symbol) {
                position.mark(last, contract_size);
            }
        }

        Ok(())
    }

    /// Net a fill into the account and emit position/bracket events.
    fn settle_fill(
        account: &mut Account,
        streams: &SimStreams,
        order: &Order,
        price: Decimal,
        time: DateTime<Utc>,
    ) {
        let outcome = account.apply_fill(order, price, time);

        for id in &outcome.cancelled_brackets {
            Self::cancel_active(account, streams, id);
        }

        let has_active = outcome.opened.is_some();
        match (outcome.archived, outcome.opened) {
            (None, Some(opened)) => streams.positions.publish(StreamEvent::create(opened)),
            (Some(archived), Some(opened)) => {
                streams.positions.publish(StreamEvent::update(archived, opened))
            }
            (Some(archived), None) => streams.positions.publish(StreamEvent::delete(archived)),
            (None, None) => {}
        }

        // Bracket children ride on every active-position creation, through
        // the same admission path as user orders.
        if has_active && !order.orders.is_empty() {
            for child in &order.orders {
                let mut child = child.clone();
                child.symbol = order.symbol.clone();
                match Self::admit_order(account, streams, child, time) {
                    Ok(admitted) => {
                        if let Some(position) = account.active_positions.get_mut(&order.symbol) {
                            position.orders.push(admitted);
                        }
                    }
                    Err((_, error)) => {
                        warn!(%error, parent = %order.id, "bracket child rejected");
                    }
                }
            }
        }
    }

    /// Cancel an active order and its bracket children, recursively.
    ///
    /// Missing or already-terminal ids are a no-op.
    fn cancel_active(account: &mut Account, streams: &SimStreams, id: &OrderId) -> Option<Order> {
        let mut order = account.active_orders.remove(id)?;
        if order.cancel().is_err() {
            return None;
        }
        let child_ids: Vec<OrderId> = order.orders.iter().map(|c| c.id.clone()).collect();
        account.archive_order(order.clone());
        streams.orders.publish(StreamEvent::delete(order.clone()));
        for child_id in &child_ids {
            Self::cancel_active(account, streams, child_id);
        }
        Some(order)
    }

    fn validate(account: &Account, order: &Order) -> Result<(), GatewayError> {
        if order.symbol.trim().is_empty() {
            return Err(GatewayError::validation("order has no instrument"));
        }
        if order.volume <= Decimal::ZERO {
            return Err(GatewayError::validation(format!(
                "volume must be positive, got {}",
                order.volume
            )));
        }
        if order.order_type.requires_price() && order.price.is_none() {
            return Err(GatewayError::validation(format!(
                "{} order requires a price",
                order.order_type
            )));
        }
        if account.active_orders.contains_key(&order.id) {
            return Err(GatewayError::validation(format!(
                "duplicate order id {}",
                order.id
            )));
        }
        Ok(())
    }

    /// Admission: validate, then fill (market) or rest (priced types).
    ///
    /// Rejections are emitted on the order stream and returned alongside the
    /// rejected snapshot; they never mutate positions or balance.
    fn admit_order(
        account: &mut Account,
        streams: &SimStreams,
        mut order: Order,
        fallback_time: DateTime<Utc>,
    ) -> Result<Order, (Order, GatewayError)> {
        if let Err(error) = Self::validate(account, &order) {
            order.status = OrderStatus::Rejected;
            account.archive_order(order.clone());
            streams.orders.publish(StreamEvent::create(order.clone()));
            return Err((order, error));
        }

        match order.order_type {
            OrderType::Market => {
                let last_point = account
                    .instruments
                    .get(&order.symbol)
                    .and_then(|i| i.last_point())
                    .cloned();
                let fill = last_point
                    .as_ref()
                    .and_then(|point| Self::market_price(order.side, point).map(|p| (p, point.time)));
                let Some((price, time)) = fill else {
                    let error = GatewayError::validation(format!(
                        "no market data for {}",
                        order.symbol
                    ));
                    order.status = OrderStatus::Rejected;
                    account.archive_order(order.clone());
                    streams.orders.publish(StreamEvent::create(order.clone()));
                    return Err((order, error));
                };

                order.time = Some(time);
                if let Err(e) = order.fill(price, time) {
                    return Err((order, GatewayError::Invariant(e.to_string())));
                }
                account.archive_order(order.clone());
                streams.orders.publish(StreamEvent::create(order.clone()));
                Self::settle_fill(account, streams, &order, price, time);
                Ok(order)
            }
            OrderType::Limit | OrderType::Stop | OrderType::StopLimit => {
                // Resting orders are never filled at admission, even when
                // immediately executable; the next tick evaluates them.
                let time = account
                    .instruments
                    .get(&order.symbol)
                    .and_then(|i| i.last_point())
                    .map(|p| p.time)
                    .unwrap_or(fallback_time);
                order.time = Some(time);
                if let Err(e) = order.transition_to(OrderStatus::Placed) {
                    return Err((order, GatewayError::Invariant(e.to_string())));
                }
                if let Err(e) = account.add_order(order.clone()) {
                    return Err((order, GatewayError::validation(e.to_string())));
                }
                streams.orders.publish(StreamEvent::create(order.clone()));
                Ok(order)
            }
        }
    }
}

#[async_trait]
impl Gateway for SimGateway {
    async fn connect(&mut self) -> Response<ConnectionStatus> {
        // Idempotent: tear down any previous session first.
        self.disconnect().await;

        let symbols: Vec<String> = {
            let account = self.account.lock();
            account.instruments.keys().cloned().collect()
        };

        let mut sources: Vec<Box<dyn TickSource>> = Vec::new();
        for symbol in symbols {
            match FileTickSource::open(&self.config.source, &symbol) {
                Ok(source) => sources.push(Box::new(source)),
                Err(error) => {
                    warn!(%symbol, %error, "tick source unavailable");
                    self.streams.errors.publish(StreamEvent::create(error));
                }
            }
        }

        let (disconnect_tx, disconnect_rx) = broadcast::channel(1);
        let (point_tx, mut point_rx) = mpsc::unbounded_channel();

        let scheduler = FeedScheduler::new(TickMerge::new(sources), self.config.speed);
        self.feed_tasks
            .push(tokio::spawn(scheduler.run(point_tx, disconnect_rx)));

        let account = Arc::clone(&self.account);
        let streams = self.streams.clone();
        self.feed_tasks.push(tokio::spawn(async move {
            while let Some(point) = point_rx.recv().await {
                if let Err(error) = SimGateway::on_point(&account, &streams, point) {
                    let fatal = error.is_fatal();
                    streams.errors.publish(StreamEvent::create(error));
                    if fatal {
                        break;
                    }
                }
            }
            debug!("engine loop finished");
        }));

        self.disconnect_tx = Some(disconnect_tx);
        self.status = ConnectionStatus::Connected;
        Response::ok(self.status)
    }

    async fn disconnect(&mut self) -> Response<ConnectionStatus> {
        if let Some(tx) = self.disconnect_tx.take() {
            let _ = tx.send(());
        }
        for mut task in self.feed_tasks.drain(..) {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        self.status = ConnectionStatus::Disconnected;
        Response::ok(self.status)
    }

    async fn subscribe(&mut self, instrument: Instrument) -> Response<()> {
        let mut account = self.account.lock();
        account
            .instruments
            .insert(instrument.name.clone(), instrument);
        Response::ok(())
    }

    async fn unsubscribe(&mut self, name: &str) -> Response<()> {
        let mut account = self.account.lock();
        account.instruments.remove(name);
        Response::ok(())
    }

    async fn get_account(&mut self, _criteria: Criteria) -> Response<Account> {
        let mut account = self.account.lock();
        account.recompute();
        Response::ok(account.clone())
    }

    async fn create_orders(&mut self, orders: Vec<Order>) -> Response<Vec<Order>> {
        let mut results = Vec::with_capacity(orders.len());
        let mut errors = Vec::new();
        {
            let mut account = self.account.lock();
            let fallback_time = Utc::now();
            for order in orders {
                match Self::admit_order(&mut account, &self.streams, order, fallback_time) {
                    Ok(admitted) => results.push(admitted),
                    Err((rejected, error)) => {
                        results.push(rejected);
                        errors.push(ErrorItem::new(error.to_string()));
                    }
                }
            }
        }
        Response {
            data: Some(results),
            errors,
        }
    }

    async fn delete_orders(&mut self, orders: Vec<Order>) -> Response<Vec<Order>> {
        let mut results = Vec::with_capacity(orders.len());
        {
            let mut account = self.account.lock();
            for order in orders {
                match Self::cancel_active(&mut account, &self.streams, &order.id) {
                    Some(cancelled) => results.push(cancelled),
                    // Unknown or already terminal: no-op.
                    None => results.push(order),
                }
            }
        }
        Response::ok(results)
    }

    async fn get_points(&self, criteria: Criteria) -> Response<Vec<Point>> {
        let Some(symbol) = criteria.get("instrument") else {
            return Response::fail("instrument criteria required");
        };
        let account = self.account.lock();
        match account.instruments.get(symbol) {
            Some(instrument) => Response::ok(instrument.points.clone()),
            None => Response::fail(format!("unknown instrument {symbol}")),
        }
    }

    async fn get_dom(&self, criteria: Criteria) -> Response<Dom> {
        let Some(symbol) = criteria.get("instrument") else {
            return Response::fail("instrument criteria required");
        };
        let account = self.account.lock();
        let last = account
            .instruments
            .get(symbol)
            .and_then(|i| i.last_point())
            .cloned();
        match last {
            Some(point) => Response::ok(Dom {
                bids: vec![point.clone()],
                asks: vec![point],
            }),
            None => Response::fail(format!("no market data for {symbol}")),
        }
    }

    async fn get_positions(&self, _criteria: Criteria) -> Response<Vec<Position>> {
        let account = self.account.lock();
        let mut positions = account.positions.clone();
        positions.extend(account.active_positions.values().cloned());
        Response::ok(positions)
    }

    async fn get_orders(&self, _criteria: Criteria) -> Response<Vec<Order>> {
        let account = self.account.lock();
        Response::ok(account.active_orders.values().cloned().collect())
    }

    fn point_stream(&self) -> EventStream<Point> {
        self.streams.points.clone()
    }

    fn order_stream(&self) -> EventStream<Order> {
        self.streams.orders.clone()
    }

    fn position_stream(&self) -> EventStream<Position> {
        self.streams.positions.clone()
    }

    fn error_stream(&self) -> EventStream<GatewayError> {
        self.streams.errors.clone()
    }
}
