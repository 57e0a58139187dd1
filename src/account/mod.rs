//! Account state: balance, orders, positions, and the netting rules.
//!
//! The account is mutated only by its gateway (simulator or live adapter);
//! strategies observe snapshots via streams. Invariants enforced here:
//!
//! - at most one net position per instrument;
//! - order ids are unique within the active set;
//! - balance moves only when a position is closed by a fill or an explicit
//!   close; mark-to-market never touches it.

mod position;

pub use position::{trim_ledger, weighted_open, CloseReason, Fill, Position};

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{Instrument, InstrumentKind};
use crate::orders::{Order, OrderError, OrderId, Transaction};

/// Result of netting a fill against the account.
///
/// Carries everything the gateway needs to emit events: the archived
/// position (if any), a snapshot of the new active position (if any), the
/// amount realized into the balance, and brackets that must be cancelled
/// because their position is gone.
#[derive(Debug, Clone, Default)]
pub struct NettingOutcome {
    /// Position archived to history by this fill
    pub archived: Option<Position>,
    /// Snapshot of the active position after this fill
    pub opened: Option<Position>,
    /// Amount added to the balance
    pub realized: Decimal,
    /// Bracket orders orphaned by the archived position
    pub cancelled_brackets: Vec<OrderId>,
}

/// Trading account owning its instruments, orders, and positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Broker-visible identifier
    pub descriptor: String,
    /// Balance at session start
    pub initial_balance: Decimal,
    /// Current balance: initial plus realized P&L
    pub balance: Decimal,
    /// Instruments keyed by name
    pub instruments: HashMap<String, Instrument>,
    /// Historical orders, append-only
    pub orders: Vec<Order>,
    /// Working orders keyed by id
    pub active_orders: HashMap<OrderId, Order>,
    /// Historical positions, append-only
    pub positions: Vec<Position>,
    /// Active positions keyed by instrument name, at most one per instrument
    pub active_positions: HashMap<String, Position>,
    /// Audit log of executions
    pub deals: Vec<Transaction>,
}

impl Account {
    /// Create an account with a starting balance.
    pub fn new(descriptor: impl Into<String>, initial_balance: Decimal) -> Self {
        Self {
            descriptor: descriptor.into(),
            initial_balance,
            balance: initial_balance,
            instruments: HashMap::new(),
            orders: Vec::new(),
            active_orders: HashMap::new(),
            positions: Vec::new(),
            active_positions: HashMap::new(),
            deals: Vec::new(),
        }
    }

    /// Look up or create the instrument for `name`.
    pub fn ensure_instrument(&mut self, name: &str) -> &mut Instrument {
        self.instruments.entry(name.to_string()).or_insert_with(|| {
            Instrument::new(name, InstrumentKind::Equity, Duration::from_secs(60))
        })
    }

    /// Contract multiplier for an instrument, 1 when unknown.
    pub fn contract_size(&self, symbol: &str) -> Decimal {
        self.instruments
            .get(symbol)
            .map(|i| i.effective_contract_size())
            .unwrap_or(Decimal::ONE)
    }

    /// Admit an order into the active set.
    ///
    /// The id must not collide with any active order.
    pub fn add_order(&mut self, order: Order) -> Result<(), OrderError> {
        if self.active_orders.contains_key(&order.id) {
            return Err(OrderError::DuplicateId(order.id));
        }
        self.active_orders.insert(order.id.clone(), order);
        Ok(())
    }

    /// Replace an active order in place.
    pub fn update_order(&mut self, order: Order) -> Result<(), OrderError> {
        match self.active_orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order;
                Ok(())
            }
            None => Err(OrderError::NotFound(order.id)),
        }
    }

    /// Remove an order from the active set, archiving it to history.
    pub fn remove_order(&mut self, id: &OrderId) -> Option<Order> {
        let order = self.active_orders.remove(id)?;
        self.orders.push(order.clone());
        Some(order)
    }

    /// Archive a terminal order straight to history.
    pub fn archive_order(&mut self, order: Order) {
        self.orders.push(order);
    }

    /// Net a fill into the account, producing the position transitions.
    ///
    /// Exactly one of four things happens against an existing position on
    /// the same instrument: increase (same side), flat close (equal opposite
    /// volume), partial reduce (smaller opposite volume), or reverse (larger
    /// opposite volume). Without an existing position, a fresh one opens.
    pub fn apply_fill(
        &mut self,
        order: &Order,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> NettingOutcome {
        let contract_size = self.contract_size(&order.symbol);
        self.deals.push(Transaction {
            symbol: order.symbol.clone(),
            time,
            price,
            volume: order.volume,
        });

        let mut outcome = NettingOutcome::default();

        let previous = match self.active_positions.remove(&order.symbol) {
            None => {
                let opened =
                    Position::open(order.symbol.as_str(), order.side, price, order.volume, time);
                outcome.opened = Some(opened.clone());
                self.active_positions.insert(order.symbol.clone(), opened);
                return outcome;
            }
            Some(previous) => previous,
        };

        outcome.cancelled_brackets = previous.orders.iter().map(|o| o.id.clone()).collect();

        if previous.side == order.side {
            // Increase: merge ledgers and re-average. The superseded position
            // is archived against the new open price for audit; the balance
            // moves only on opposite-side closes.
            let mut ledger = previous.open_prices.clone();
            ledger.push(Fill::new(price, order.volume));
            let merged = Position::from_ledger(order.symbol.as_str(), order.side, ledger, time);

            let mut archived = previous;
            archived.close(
                merged.open_price,
                archived.volume,
                time,
                contract_size,
                CloseReason::Merge,
            );
            outcome.archived = Some(archived.clone());
            self.positions.push(archived);

            outcome.opened = Some(merged.clone());
            self.active_positions.insert(order.symbol.clone(), merged);
        } else if order.volume == previous.volume {
            // Flat close at the fill price.
            let mut archived = previous;
            archived.close(price, archived.volume, time, contract_size, CloseReason::Fill);
            let realized = archived.gain_loss.unwrap_or_default();
            self.balance += realized;
            outcome.realized = realized;
            outcome.archived = Some(archived.clone());
            self.positions.push(archived);
        } else if order.volume < previous.volume {
            // Partial reduce: realize on the filled volume, keep the rest.
            let remaining = previous.volume - order.volume;

            let successor = Position::from_ledger(
                order.symbol.as_str(),
                previous.side,
                trim_ledger(&previous.open_prices, remaining, previous.volume),
                previous.time,
            );

            let mut archived = previous;
            archived.open_prices =
                trim_ledger(&archived.open_prices, order.volume, archived.volume);
            archived.volume = order.volume;
            archived.close(price, order.volume, time, contract_size, CloseReason::Fill);
            let realized = archived.gain_loss.unwrap_or_default();
            self.balance += realized;
            outcome.realized = realized;
            outcome.archived = Some(archived.clone());
            self.positions.push(archived);

            outcome.opened = Some(successor.clone());
            self.active_positions.insert(order.symbol.clone(), successor);
        } else {
            // Reverse: close the whole position, flip the remainder.
            let flipped = order.volume - previous.volume;

            let mut archived = previous;
            archived.close(price, archived.volume, time, contract_size, CloseReason::Fill);
            let realized = archived.gain_loss.unwrap_or_default();
            self.balance += realized;
            outcome.realized = realized;
            outcome.archived = Some(archived.clone());
            self.positions.push(archived);

            let opened = Position::open(order.symbol.as_str(), order.side, price, flipped, time);
            outcome.opened = Some(opened.clone());
            self.active_positions.insert(order.symbol.clone(), opened);
        }

        outcome
    }

    /// Close the active position on `symbol` at `price`, realizing P&L.
    ///
    /// A missing position is a no-op returning `None`.
    pub fn close_position(
        &mut self,
        symbol: &str,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> Option<Position> {
        let contract_size = self.contract_size(symbol);
        let mut position = self.active_positions.remove(symbol)?;
        position.close(price, position.volume, time, contract_size, CloseReason::Fill);
        self.balance += position.gain_loss.unwrap_or_default();
        self.positions.push(position.clone());
        Some(position)
    }

    /// Mark-to-market estimate for the active position on `symbol`.
    ///
    /// Never mutates the balance.
    pub fn estimated_gain_loss(&self, symbol: &str, last: Decimal) -> Option<Decimal> {
        let contract_size = self.contract_size(symbol);
        self.active_positions
            .get(symbol)
            .map(|p| p.gain_loss_for(last, p.volume, contract_size))
    }

    /// Re-derive the balance from the initial balance and realized history.
    pub fn recompute(&mut self) {
        self.balance = self.initial_balance
            + self
                .positions
                .iter()
                .filter(|p| p.close_reason == Some(CloseReason::Fill))
                .filter_map(|p| p.gain_loss)
                .sum::<Decimal>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderSide;
    use rust_decimal_macros::dec;

    fn market(symbol: &str, side: OrderSide, volume: Decimal) -> Order {
        Order::market(symbol, side, volume).build().unwrap()
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_open_position_from_fill() {
        let mut account = Account::new("sim", dec!(50000));
        let order = market("ES", OrderSide::Buy, dec!(1));

        let outcome = account.apply_fill(&order, dec!(101), t(0));

        assert!(outcome.archived.is_none());
        let opened = outcome.opened.unwrap();
        assert_eq!(opened.open_price, dec!(101));
        assert_eq!(account.active_positions.len(), 1);
        assert_eq!(account.balance, dec!(50000));
        assert_eq!(account.deals.len(), 1);
    }

    #[test]
    fn test_increase_averages_without_realizing() {
        let mut account = Account::new("sim", dec!(50000));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(1)), dec!(101), t(0));
        let outcome = account.apply_fill(&market("ES", OrderSide::Buy, dec!(1)), dec!(103), t(1));

        let active = &account.active_positions["ES"];
        assert_eq!(active.volume, dec!(2));
        assert_eq!(active.open_price, dec!(102));
        assert_eq!(active.open_prices.len(), 2);

        // Superseded position archived against the averaged price.
        let archived = outcome.archived.unwrap();
        assert_eq!(archived.close_price, Some(dec!(102)));
        assert_eq!(archived.close_reason, Some(CloseReason::Merge));
        assert_eq!(archived.gain_loss, Some(dec!(1)));

        // Balance untouched by the averaging.
        assert_eq!(account.balance, dec!(50000));
        assert_eq!(outcome.realized, Decimal::ZERO);
    }

    #[test]
    fn test_flat_close_realizes() {
        let mut account = Account::new("sim", dec!(50000));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(1)), dec!(101), t(0));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(1)), dec!(103), t(1));
        let outcome = account.apply_fill(&market("ES", OrderSide::Sell, dec!(2)), dec!(105), t(2));

        assert!(account.active_positions.is_empty());
        assert_eq!(outcome.realized, dec!(6));
        assert_eq!(account.balance, dec!(50006));
    }

    #[test]
    fn test_partial_reduce() {
        let mut account = Account::new("sim", dec!(1000));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(3)), dec!(100), t(0));
        let outcome = account.apply_fill(&market("ES", OrderSide::Sell, dec!(1)), dec!(104), t(1));

        // Realized only on the closed lot.
        assert_eq!(outcome.realized, dec!(4));
        assert_eq!(account.balance, dec!(1004));

        let active = &account.active_positions["ES"];
        assert_eq!(active.side, OrderSide::Buy);
        assert_eq!(active.volume, dec!(2));
        assert_eq!(active.open_price, dec!(100));

        let archived = outcome.archived.unwrap();
        assert_eq!(archived.volume, dec!(1));
        assert_eq!(archived.close_price, Some(dec!(104)));
    }

    #[test]
    fn test_reverse() {
        let mut account = Account::new("sim", dec!(50000));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(2)), dec!(100), t(0));
        let outcome = account.apply_fill(&market("ES", OrderSide::Sell, dec!(5)), dec!(105), t(1));

        assert_eq!(outcome.realized, dec!(10));
        assert_eq!(account.balance, dec!(50010));

        let active = &account.active_positions["ES"];
        assert_eq!(active.side, OrderSide::Sell);
        assert_eq!(active.volume, dec!(3));
        assert_eq!(active.open_price, dec!(105));
        assert_eq!(active.open_prices.len(), 1);
    }

    #[test]
    fn test_one_net_position_per_instrument() {
        let mut account = Account::new("sim", dec!(1000));
        for _ in 0..4 {
            account.apply_fill(&market("ES", OrderSide::Buy, dec!(1)), dec!(100), t(0));
            assert_eq!(account.active_positions.len(), 1);
        }
        account.apply_fill(&market("NQ", OrderSide::Buy, dec!(1)), dec!(50), t(1));
        assert_eq!(account.active_positions.len(), 2);
    }

    #[test]
    fn test_close_missing_position_is_noop() {
        let mut account = Account::new("sim", dec!(1000));
        assert!(account.close_position("ES", dec!(100), t(0)).is_none());
        assert_eq!(account.balance, dec!(1000));
    }

    #[test]
    fn test_duplicate_active_order_rejected() {
        let mut account = Account::new("sim", dec!(1000));
        let order = Order::limit("ES", OrderSide::Buy, dec!(1), dec!(99))
            .with_id("fixed")
            .build()
            .unwrap();
        account.add_order(order.clone()).unwrap();
        assert!(matches!(
            account.add_order(order),
            Err(OrderError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_update_and_remove_order() {
        let mut account = Account::new("sim", dec!(1000));
        let mut order = Order::limit("ES", OrderSide::Buy, dec!(1), dec!(99))
            .with_id("o-1")
            .build()
            .unwrap();
        account.add_order(order.clone()).unwrap();

        order.price = Some(dec!(98));
        account.update_order(order.clone()).unwrap();
        assert_eq!(
            account.active_orders[&order.id].price,
            Some(dec!(98))
        );

        let removed = account.remove_order(&order.id).unwrap();
        assert_eq!(removed.id, order.id);
        assert!(account.active_orders.is_empty());
        // Removed orders land on the append-only history.
        assert_eq!(account.orders.len(), 1);

        let ghost = Order::limit("ES", OrderSide::Buy, dec!(1), dec!(99))
            .with_id("o-2")
            .build()
            .unwrap();
        assert!(matches!(
            account.update_order(ghost),
            Err(OrderError::NotFound(_))
        ));
    }

    #[test]
    fn test_recompute_matches_balance() {
        let mut account = Account::new("sim", dec!(50000));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(1)), dec!(101), t(0));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(1)), dec!(103), t(1));
        account.apply_fill(&market("ES", OrderSide::Sell, dec!(2)), dec!(105), t(2));
        account.apply_fill(&market("NQ", OrderSide::Sell, dec!(2)), dec!(50), t(3));
        account.apply_fill(&market("NQ", OrderSide::Buy, dec!(1)), dec!(48), t(4));

        let balance = account.balance;
        account.recompute();
        assert_eq!(account.balance, balance);
    }

    #[test]
    fn test_estimated_gain_loss_does_not_mutate() {
        let mut account = Account::new("sim", dec!(1000));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(2)), dec!(100), t(0));

        assert_eq!(account.estimated_gain_loss("ES", dec!(103)), Some(dec!(6)));
        assert_eq!(account.balance, dec!(1000));
        assert_eq!(account.estimated_gain_loss("NQ", dec!(1)), None);
    }

    #[test]
    fn test_contract_size_scales_gain_loss() {
        let mut account = Account::new("sim", dec!(1000));
        account
            .ensure_instrument("ES")
            .contract_size = Some(dec!(50));
        account.apply_fill(&market("ES", OrderSide::Buy, dec!(1)), dec!(100), t(0));
        let outcome = account.apply_fill(&market("ES", OrderSide::Sell, dec!(1)), dec!(102), t(1));

        assert_eq!(outcome.realized, dec!(100));
        assert_eq!(account.balance, dec!(1100));
    }
}
