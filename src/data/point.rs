//! Top-of-book tick data.
//!
//! A [`Point`] is one observation of best bid/ask for one instrument at one
//! instant. Points reference their instrument by name; ownership of the
//! series stays with the instrument inside the account.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// A single top-of-book observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Observation timestamp, monotonic within one instrument
    pub time: DateTime<Utc>,

    /// Instrument name this point belongs to
    pub symbol: String,

    /// Best bid price
    pub bid: Option<Decimal>,

    /// Best ask price
    pub ask: Option<Decimal>,

    /// Last traded or derived price: ask when ask size is positive, else bid
    pub last: Option<Decimal>,

    /// Size at the best bid
    pub bid_size: Decimal,

    /// Size at the best ask
    pub ask_size: Decimal,
}

impl Point {
    /// Create a point, deriving `last` from the quoted side with liquidity.
    pub fn new(
        time: DateTime<Utc>,
        symbol: impl Into<String>,
        bid: Option<Decimal>,
        ask: Option<Decimal>,
        bid_size: Decimal,
        ask_size: Decimal,
    ) -> Self {
        let last = if ask_size > Decimal::ZERO { ask } else { bid };
        Self {
            time,
            symbol: symbol.into(),
            bid,
            ask,
            last,
            bid_size,
            ask_size,
        }
    }

    /// Returns true unless both sides are quoted and crossed.
    pub fn is_valid(&self) -> bool {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => bid <= ask,
            _ => true,
        }
    }

    /// Bid/ask midpoint, when both sides are quoted.
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Parse one line of the text tick format:
    /// `<unixSeconds> <bid> <bidSize> <ask> <askSize>`.
    pub fn parse_line(symbol: &str, line: &str) -> GatewayResult<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(GatewayError::parse(format!(
                "expected 5 fields, got {}: {line:?}",
                fields.len()
            )));
        }

        let epoch: i64 = fields[0]
            .parse()
            .map_err(|_| GatewayError::parse(format!("bad epoch {:?}", fields[0])))?;
        let time = DateTime::from_timestamp(epoch, 0)
            .ok_or_else(|| GatewayError::parse(format!("epoch out of range {epoch}")))?;

        let decimal = |field: &str| {
            field
                .parse::<Decimal>()
                .map_err(|_| GatewayError::parse(format!("bad decimal {field:?}")))
        };

        let bid = decimal(fields[1])?;
        let bid_size = decimal(fields[2])?;
        let ask = decimal(fields[3])?;
        let ask_size = decimal(fields[4])?;

        Ok(Self::new(
            time,
            symbol,
            Some(bid),
            Some(ask),
            bid_size,
            ask_size,
        ))
    }

    /// Format back to the text tick line. Inverse of [`Point::parse_line`].
    pub fn format_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.time.timestamp(),
            self.bid.unwrap_or_default(),
            self.bid_size,
            self.ask.unwrap_or_default(),
            self.ask_size,
        )
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} bid: {:?}@{} ask: {:?}@{}",
            self.time.format("%H:%M:%S"),
            self.symbol,
            self.bid,
            self.bid_size,
            self.ask,
            self.ask_size,
        )
    }
}
