//! Per-exchange event fan-in and snapshot publication

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::RECENT_TRADES_CAP;
use crate::errors::{EngineError, EngineResult};
use crate::feed::events::{EventKind, FeedEvent};
use crate::types::{
    ExchangeId, FundingRate, InstrumentId, MarketDepth, MarketSnapshot, Price, Quote, Trade,
};

#[derive(Debug, Default, Clone)]
pub struct FeedCounters {
    pub events_accepted: u64,
    pub events_dropped: u64,
    pub sequence_gaps: u64,
    pub crossed_quotes_rejected: u64,
    pub stale_instruments_excluded: u64,
}

/// Merges ordered per-exchange streams into immutable `MarketSnapshot`
/// values. For each (exchange, instrument, kind) stream only events whose
/// sequence strictly exceeds the previously retained one are kept; gaps
/// are logged and processed anyway. Consumers receive snapshots through a
/// watch channel, so a slow consumer only ever sees the newest one.
pub struct FeedAggregator {
    staleness_budget: Duration,
    last_sequences: HashMap<(ExchangeId, InstrumentId, EventKind), u64>,
    quotes: HashMap<InstrumentId, HashMap<ExchangeId, Quote>>,
    trades: HashMap<InstrumentId, VecDeque<Trade>>,
    depth: HashMap<InstrumentId, MarketDepth>,
    funding: HashMap<InstrumentId, FundingRate>,
    mark_prices: HashMap<InstrumentId, Price>,
    index_prices: HashMap<InstrumentId, Price>,
    counters: FeedCounters,
    publisher: watch::Sender<Arc<MarketSnapshot>>,
}

impl FeedAggregator {
    pub fn new(staleness_budget_ms: i64) -> Self {
        let (publisher, _) = watch::channel(Arc::new(MarketSnapshot::empty()));
        Self {
            staleness_budget: Duration::milliseconds(staleness_budget_ms),
            last_sequences: HashMap::new(),
            quotes: HashMap::new(),
            trades: HashMap::new(),
            depth: HashMap::new(),
            funding: HashMap::new(),
            mark_prices: HashMap::new(),
            index_prices: HashMap::new(),
            counters: FeedCounters::default(),
            publisher,
        }
    }

    pub fn counters(&self) -> &FeedCounters {
        &self.counters
    }

    /// Latest-wins subscription: receivers that fall behind skip straight
    /// to the newest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MarketSnapshot>> {
        self.publisher.subscribe()
    }

    pub fn apply(&mut self, exchange: &str, event: FeedEvent) {
        if let Some(sequence) = event.sequence_number() {
            let key = (
                exchange.to_string(),
                event.instrument_id().clone(),
                event.kind(),
            );
            if let Some(&last) = self.last_sequences.get(&key) {
                if sequence <= last {
                    self.counters.events_dropped += 1;
                    debug!(
                        exchange,
                        instrument = %key.1,
                        sequence,
                        last,
                        "dropping out-of-order event"
                    );
                    return;
                }
                if sequence > last + 1 {
                    self.counters.sequence_gaps += 1;
                    let gap = EngineError::SequenceGap {
                        exchange: exchange.to_string(),
                        instrument: key.1.clone(),
                        expected: last + 1,
                        observed: sequence,
                    };
                    warn!("{gap}");
                }
            }
            self.last_sequences.insert(key, sequence);
        }

        match event {
            FeedEvent::Quote(quote) => {
                if quote.is_crossed() {
                    self.counters.crossed_quotes_rejected += 1;
                    warn!(
                        exchange,
                        instrument = %quote.instrument_id,
                        bid = quote.bid_price,
                        ask = quote.ask_price,
                        "rejecting crossed quote"
                    );
                    return;
                }
                self.quotes
                    .entry(quote.instrument_id.clone())
                    .or_default()
                    .insert(exchange.to_string(), quote);
            }
            FeedEvent::Trade(trade) => {
                let history = self.trades.entry(trade.instrument_id.clone()).or_default();
                history.push_back(trade);
                while history.len() > RECENT_TRADES_CAP {
                    history.pop_front();
                }
            }
            FeedEvent::Depth(mut depth) => {
                depth.bids.retain(|(_, size)| *size > 0.0);
                depth.asks.retain(|(_, size)| *size > 0.0);
                self.depth.insert(depth.instrument_id.clone(), depth);
            }
            FeedEvent::Funding(funding) => {
                self.funding.insert(funding.instrument_id.clone(), funding);
            }
            FeedEvent::MarkPrice {
                instrument_id,
                price,
            } => {
                self.mark_prices.insert(instrument_id, price);
            }
            FeedEvent::IndexPrice {
                instrument_id,
                price,
            } => {
                self.index_prices.insert(instrument_id, price);
            }
        }
        self.counters.events_accepted += 1;
    }

    /// Build an immutable snapshot as of `now`. Stale quotes are excluded
    /// but remain queryable inside the aggregator; the call fails only
    /// when every known instrument is stale.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> EngineResult<Arc<MarketSnapshot>> {
        let mut best_quotes = HashMap::new();
        let mut exchange_quotes: HashMap<InstrumentId, HashMap<ExchangeId, Quote>> = HashMap::new();
        let mut snapshot_time: Option<DateTime<Utc>> = None;

        for (instrument, venues) in &self.quotes {
            let fresh: HashMap<ExchangeId, Quote> = venues
                .iter()
                .filter(|(_, quote)| quote.age(now) <= self.staleness_budget)
                .map(|(exchange, quote)| (exchange.clone(), quote.clone()))
                .collect();

            if fresh.is_empty() {
                self.counters.stale_instruments_excluded += 1;
                continue;
            }

            // Best quote: tightest spread, ties broken by newest timestamp.
            let best = fresh
                .values()
                .min_by(|a, b| {
                    a.spread()
                        .partial_cmp(&b.spread())
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.timestamp.cmp(&a.timestamp))
                })
                .cloned();

            if let Some(best) = best {
                snapshot_time = Some(match snapshot_time {
                    Some(t) => t.max(best.timestamp),
                    None => best.timestamp,
                });
                for quote in fresh.values() {
                    snapshot_time = snapshot_time.map(|t| t.max(quote.timestamp));
                }
                best_quotes.insert(instrument.clone(), best);
                exchange_quotes.insert(instrument.clone(), fresh);
            }
        }

        if best_quotes.is_empty() && !self.quotes.is_empty() {
            return Err(EngineError::FeedStale {
                known_instruments: self.quotes.len(),
            });
        }

        Ok(Arc::new(MarketSnapshot {
            quotes: best_quotes,
            exchange_quotes,
            recent_trades: self
                .trades
                .iter()
                .map(|(id, trades)| (id.clone(), trades.iter().cloned().collect()))
                .collect(),
            depth: self.depth.clone(),
            funding_rates: self.funding.clone(),
            mark_prices: self.mark_prices.clone(),
            index_prices: self.index_prices.clone(),
            snapshot_time: snapshot_time.unwrap_or(now),
        }))
    }

    /// Snapshot and publish on the watch channel.
    pub fn publish(&mut self, now: DateTime<Utc>) -> EngineResult<Arc<MarketSnapshot>> {
        let snapshot = self.snapshot(now)?;
        self.publisher.send_replace(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Stale quotes stay queryable even though snapshots exclude them.
    pub fn latest_quote(&self, exchange: &str, instrument: &str) -> Option<&Quote> {
        self.quotes.get(instrument)?.get(exchange)
    }
}
