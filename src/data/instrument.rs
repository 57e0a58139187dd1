//! Instruments and their tick series.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::point::Point;
use crate::stream::StreamAction;

/// Asset class of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentKind {
    /// Cash equity
    Equity,
    /// Futures contract
    Future,
    /// Option contract
    Option,
    /// Currency pair
    Fx,
    /// Crypto asset
    Crypto,
}

impl Default for InstrumentKind {
    fn default() -> Self {
        InstrumentKind::Equity
    }
}

/// One time bucket of aggregated points.
///
/// Prices track the latest point in the bucket; sizes accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointGroup {
    /// Bucket start time
    pub time: DateTime<Utc>,
    /// Bid of the latest point in the bucket
    pub bid: Option<Decimal>,
    /// Ask of the latest point in the bucket
    pub ask: Option<Decimal>,
    /// Last of the latest point in the bucket
    pub last: Option<Decimal>,
    /// Accumulated bid size
    pub bid_size: Decimal,
    /// Accumulated ask size
    pub ask_size: Decimal,
}

impl PointGroup {
    fn open(time: DateTime<Utc>, point: &Point) -> Self {
        Self {
            time,
            bid: point.bid,
            ask: point.ask,
            last: point.last,
            bid_size: point.bid_size,
            ask_size: point.ask_size,
        }
    }

    fn absorb(&mut self, point: &Point) {
        self.bid = point.bid;
        self.ask = point.ask;
        self.last = point.last;
        self.bid_size += point.bid_size;
        self.ask_size += point.ask_size;
    }
}

/// A tradable instrument owning its tick series.
///
/// The account owns its instruments; points reference the instrument by
/// `name` rather than holding a pointer back up the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Instrument name, the key everywhere in the account
    pub name: String,
    /// Venue the instrument trades on, when known
    pub exchange: Option<String>,
    /// Asset class
    pub kind: InstrumentKind,
    /// Aggregation bucket duration for point groups
    pub time_frame: Duration,
    /// Underlying instrument name, for derivatives
    pub basis: Option<String>,
    /// Contract multiplier for P&L; 1 when absent
    pub contract_size: Option<Decimal>,
    /// Append-only tick series
    pub points: Vec<Point>,
    /// Derived time-bucketed aggregates
    pub point_groups: Vec<PointGroup>,
}

impl Instrument {
    /// Create an instrument with an empty series.
    pub fn new(name: impl Into<String>, kind: InstrumentKind, time_frame: Duration) -> Self {
        Self {
            name: name.into(),
            exchange: None,
            kind,
            time_frame,
            basis: None,
            contract_size: None,
            points: Vec::new(),
            point_groups: Vec::new(),
        }
    }

    /// Set the venue.
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Set the underlying.
    pub fn with_basis(mut self, basis: impl Into<String>) -> Self {
        self.basis = Some(basis.into());
        self
    }

    /// Set the contract multiplier.
    pub fn with_contract_size(mut self, contract_size: Decimal) -> Self {
        self.contract_size = Some(contract_size);
        self
    }

    /// Contract multiplier for P&L, defaulting to 1.
    pub fn effective_contract_size(&self) -> Decimal {
        self.contract_size.unwrap_or(Decimal::ONE)
    }

    /// Latest point in the series.
    pub fn last_point(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Bucket start for a timestamp under this instrument's time frame.
    fn bucket_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let frame_ms = self.time_frame.as_millis().max(1) as i64;
        let floored = time.timestamp_millis().div_euclid(frame_ms) * frame_ms;
        Utc.timestamp_millis_opt(floored).single().unwrap_or(time)
    }

    /// Append a point and fold it into the tail group.
    ///
    /// Returns [`StreamAction::Create`] when the point opened a new group,
    /// [`StreamAction::Update`] when it extended the current one, so callers
    /// can publish the matching series event.
    pub fn append(&mut self, point: Point) -> StreamAction {
        let bucket = self.bucket_start(point.time);
        let action = match self.point_groups.last_mut() {
            Some(group) if group.time == bucket => {
                group.absorb(&point);
                StreamAction::Update
            }
            _ => {
                self.point_groups.push(PointGroup::open(bucket, &point));
                StreamAction::Create
            }
        };
        self.points.push(point);
        action
    }
}
