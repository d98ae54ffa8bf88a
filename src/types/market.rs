//! Core market data entities

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

pub type Price = f64;
pub type Volume = f64;
pub type InstrumentId = String;
pub type ExchangeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstrumentType {
    Spot,
    Forward,
    Future,
    Perpetual,
    Option,
    Swap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub instrument_id: InstrumentId,
    pub bid_price: Price,
    pub ask_price: Price,
    pub bid_size: Volume,
    pub ask_size: Volume,
    pub timestamp: DateTime<Utc>,
    pub sequence_number: u64,
}

impl Quote {
    pub fn new(
        instrument_id: impl Into<InstrumentId>,
        bid_price: Price,
        ask_price: Price,
        bid_size: Volume,
        ask_size: Volume,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            bid_price,
            ask_price,
            bid_size,
            ask_size,
            timestamp: Utc::now(),
            sequence_number: 0,
        }
    }

    pub fn with_sequence(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn mid(&self) -> Price {
        (self.bid_price + self.ask_price) / 2.0
    }

    pub fn spread(&self) -> Price {
        self.ask_price - self.bid_price
    }

    /// Relative spread, used for confidence scoring and slippage estimates.
    pub fn spread_ratio(&self) -> f64 {
        let mid = self.mid();
        if mid > 0.0 {
            self.spread() / mid
        } else {
            0.0
        }
    }

    /// A quote with both sides populated must satisfy ask >= bid.
    pub fn is_crossed(&self) -> bool {
        self.bid_price > 0.0 && self.ask_price > 0.0 && self.ask_price < self.bid_price
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Trade {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub size: Volume,
    pub side: Side,
    pub timestamp: DateTime<Utc>,
    pub sequence_number: u64,
    pub trade_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: String,
    pub instrument_type: InstrumentType,
    pub base_currency: String,
    pub quote_currency: String,
    pub tick_size: Price,
    pub min_size: Volume,
    pub expiry: Option<DateTime<Utc>>,
    pub strike: Option<Price>,
}

impl Instrument {
    pub fn spot(id: impl Into<InstrumentId>, base: &str, quote: &str) -> Self {
        let id = id.into();
        Self {
            symbol: id.clone(),
            id,
            instrument_type: InstrumentType::Spot,
            base_currency: base.to_string(),
            quote_currency: quote.to_string(),
            tick_size: 0.0001,
            min_size: 1.0,
            expiry: None,
            strike: None,
        }
    }
}

/// Price ladder: bids descending, asks ascending, every level size > 0.
#[derive(Debug, Clone, Serialize)]
pub struct MarketDepth {
    pub instrument_id: InstrumentId,
    pub bids: Vec<(Price, Volume)>,
    pub asks: Vec<(Price, Volume)>,
    pub timestamp: DateTime<Utc>,
}

impl MarketDepth {
    pub fn best_bid(&self) -> Option<(Price, Volume)> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<(Price, Volume)> {
        self.asks.first().copied()
    }
}

impl Default for Quote {
    fn default() -> Self {
        Self {
            instrument_id: InstrumentId::default(),
            bid_price: 0.0,
            ask_price: 0.0,
            bid_size: 0.0,
            ask_size: 0.0,
            timestamp: Utc::now(),
            sequence_number: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FundingRate {
    pub instrument_id: InstrumentId,
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
    /// Funding interval, 8h on the major perpetual venues.
    pub frequency: Duration,
}

impl FundingRate {
    pub fn new(instrument_id: impl Into<InstrumentId>, rate: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            rate,
            timestamp: Utc::now(),
            frequency: Duration::hours(8),
        }
    }
}

/// Point-in-time composite of everything the aggregator knows. Immutable
/// once published; consumers share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    /// Best quote per instrument (tightest spread across exchanges).
    pub quotes: HashMap<InstrumentId, Quote>,
    /// Full per-exchange quote map for cross-exchange detectors.
    pub exchange_quotes: HashMap<InstrumentId, HashMap<ExchangeId, Quote>>,
    pub recent_trades: HashMap<InstrumentId, Vec<Trade>>,
    pub depth: HashMap<InstrumentId, MarketDepth>,
    pub funding_rates: HashMap<InstrumentId, FundingRate>,
    pub mark_prices: HashMap<InstrumentId, Price>,
    pub index_prices: HashMap<InstrumentId, Price>,
    pub snapshot_time: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn empty() -> Self {
        Self {
            quotes: HashMap::new(),
            exchange_quotes: HashMap::new(),
            recent_trades: HashMap::new(),
            depth: HashMap::new(),
            funding_rates: HashMap::new(),
            mark_prices: HashMap::new(),
            index_prices: HashMap::new(),
            snapshot_time: Utc::now(),
        }
    }

    pub fn quote(&self, instrument: &str) -> Option<&Quote> {
        self.quotes.get(instrument)
    }

    pub fn mid(&self, instrument: &str) -> Option<Price> {
        self.quotes.get(instrument).map(Quote::mid)
    }

    pub fn funding_rate(&self, instrument: &str) -> Option<f64> {
        self.funding_rates.get(instrument).map(|f| f.rate)
    }
}
