//! Normalized exchange events consumed by the aggregator

use crate::types::{FundingRate, InstrumentId, MarketDepth, Price, Quote, Trade};

/// Event kinds delivered by exchange adapters, already decoded and
/// normalized. Sequence numbers are monotonic per (exchange, instrument,
/// kind) stream.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Quote(Quote),
    Trade(Trade),
    Depth(MarketDepth),
    Funding(FundingRate),
    MarkPrice {
        instrument_id: InstrumentId,
        price: Price,
    },
    IndexPrice {
        instrument_id: InstrumentId,
        price: Price,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Quote,
    Trade,
    Depth,
    Funding,
    MarkPrice,
    IndexPrice,
}

impl FeedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Quote(_) => EventKind::Quote,
            Self::Trade(_) => EventKind::Trade,
            Self::Depth(_) => EventKind::Depth,
            Self::Funding(_) => EventKind::Funding,
            Self::MarkPrice { .. } => EventKind::MarkPrice,
            Self::IndexPrice { .. } => EventKind::IndexPrice,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            Self::Quote(q) => &q.instrument_id,
            Self::Trade(t) => &t.instrument_id,
            Self::Depth(d) => &d.instrument_id,
            Self::Funding(f) => &f.instrument_id,
            Self::MarkPrice { instrument_id, .. } => instrument_id,
            Self::IndexPrice { instrument_id, .. } => instrument_id,
        }
    }

    /// Sequence number for sequenced streams; funding and mark/index
    /// updates are last-write-wins.
    pub fn sequence_number(&self) -> Option<u64> {
        match self {
            Self::Quote(q) => Some(q.sequence_number),
            Self::Trade(t) => Some(t.sequence_number),
            _ => None,
        }
    }
}
