//! Positions and their fill ledgers.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::{Order, OrderSide};

/// One component fill in a position's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Fill price
    pub price: Decimal,
    /// Fill volume
    pub volume: Decimal,
}

impl Fill {
    /// Create a fill entry.
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

/// Volume-weighted average price over a fill ledger.
pub fn weighted_open(ledger: &[Fill]) -> Decimal {
    let total: Decimal = ledger.iter().map(|f| f.volume).sum();
    if total.is_zero() {
        return Decimal::ZERO;
    }
    ledger.iter().map(|f| f.price * f.volume).sum::<Decimal>() / total
}

/// Scale every ledger entry's volume by `kept / total`, preserving the open
/// price. Multiplying before dividing keeps whole-lot splits exact.
pub fn trim_ledger(ledger: &[Fill], kept: Decimal, total: Decimal) -> Vec<Fill> {
    if total.is_zero() {
        return Vec::new();
    }
    ledger
        .iter()
        .map(|f| Fill::new(f.price, f.volume * kept / total))
        .collect()
}

/// Why a position left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    /// Closed by an opposite-side fill or an explicit close; realized into balance
    Fill,
    /// Superseded by a same-side increase; archived for audit only
    Merge,
}

/// A net position on one instrument.
///
/// An active position has no close time and positive volume. Closed
/// positions are archived on the account's history with their realized
/// figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Unique id
    pub id: String,
    /// Instrument name
    pub symbol: String,
    /// Direction of the net position
    pub side: OrderSide,
    /// Net volume, positive while active
    pub volume: Decimal,
    /// Volume-weighted open price over the ledger
    pub open_price: Decimal,
    /// Ledger of component fills
    pub open_prices: Vec<Fill>,
    /// Open time
    pub time: DateTime<Utc>,
    /// Close time, once archived
    pub close_time: Option<DateTime<Utc>>,
    /// Close price, once archived
    pub close_price: Option<Decimal>,
    /// P&L in price points
    pub gain_loss_points: Option<Decimal>,
    /// P&L in account currency
    pub gain_loss: Option<Decimal>,
    /// What archived the position
    pub close_reason: Option<CloseReason>,
    /// Attached bracket orders
    pub orders: Vec<Order>,
}

impl Position {
    /// Open a position from a single fill.
    pub fn open(
        symbol: impl Into<String>,
        side: OrderSide,
        price: Decimal,
        volume: Decimal,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            volume,
            open_price: price,
            open_prices: vec![Fill::new(price, volume)],
            time,
            close_time: None,
            close_price: None,
            gain_loss_points: None,
            gain_loss: None,
            close_reason: None,
            orders: Vec::new(),
        }
    }

    /// Open a position from an explicit ledger; the open price is derived.
    pub fn from_ledger(
        symbol: impl Into<String>,
        side: OrderSide,
        ledger: Vec<Fill>,
        time: DateTime<Utc>,
    ) -> Self {
        let open_price = weighted_open(&ledger);
        let volume = ledger.iter().map(|f| f.volume).sum();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            volume,
            open_price,
            open_prices: ledger,
            time,
            close_time: None,
            close_price: None,
            gain_loss_points: None,
            gain_loss: None,
            close_reason: None,
            orders: Vec::new(),
        }
    }

    /// Returns true while the position is open.
    pub fn is_active(&self) -> bool {
        self.close_time.is_none() && self.volume > Decimal::ZERO
    }

    /// P&L in points against a reference price.
    pub fn points_at(&self, price: Decimal) -> Decimal {
        (price - self.open_price) * self.side.sign()
    }

    /// P&L in account currency against a reference price over `volume`.
    pub fn gain_loss_for(&self, price: Decimal, volume: Decimal, contract_size: Decimal) -> Decimal {
        self.points_at(price) * volume * contract_size
    }

    /// Refresh the unrealized figures against the latest price. Balance is
    /// untouched; this is the mark-to-market estimate.
    pub fn mark(&mut self, price: Decimal, contract_size: Decimal) {
        self.gain_loss_points = Some(self.points_at(price));
        self.gain_loss = Some(self.gain_loss_for(price, self.volume, contract_size));
    }

    /// Archive the position, realizing P&L over `closed_volume`.
    pub fn close(
        &mut self,
        price: Decimal,
        closed_volume: Decimal,
        time: DateTime<Utc>,
        contract_size: Decimal,
        reason: CloseReason,
    ) {
        self.close_time = Some(time);
        self.close_price = Some(price);
        self.close_reason = Some(reason);
        self.gain_loss_points = Some(self.points_at(price));
        self.gain_loss = Some(self.gain_loss_for(price, closed_volume, contract_size));
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position({} {} {} @ {}{})",
            self.symbol,
            self.side,
            self.volume,
            self.open_price,
            match self.close_price {
                Some(price) => format!(" closed @ {price}"),
                None => String::new(),
            },
        )
    }
}
