//! Model-implied price outputs

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::market::{InstrumentId, Price};

/// A model-implied price for a target instrument, together with the
/// components it was built from. `components` and `weights` always have
/// the same length; the weight convention is model-specific (sums to 1.0
/// for baskets, signed for spreads).
#[derive(Debug, Clone, Serialize)]
pub struct SyntheticPrice {
    pub theoretical_price: Price,
    pub bid_price: Price,
    pub ask_price: Price,
    /// Input quality score in [0, 1]: freshness, spread tightness, sample size.
    pub confidence_score: f64,
    pub component_instruments: Vec<InstrumentId>,
    pub weights: Vec<f64>,
    pub calculation_time: DateTime<Utc>,
}

impl SyntheticPrice {
    pub fn new(theoretical: Price, bid: Price, ask: Price, confidence: f64) -> Self {
        Self {
            theoretical_price: theoretical,
            bid_price: bid,
            ask_price: ask,
            confidence_score: confidence.clamp(0.0, 1.0),
            component_instruments: Vec::new(),
            weights: Vec::new(),
            calculation_time: Utc::now(),
        }
    }

    pub fn with_components(mut self, instruments: Vec<InstrumentId>, weights: Vec<f64>) -> Self {
        debug_assert_eq!(instruments.len(), weights.len());
        self.component_instruments = instruments;
        self.weights = weights;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceDeviation {
    pub instrument_id: InstrumentId,
    pub market_price: Price,
    pub theoretical_price: Price,
    pub deviation_percentage: f64,
    pub z_score: f64,
    pub confidence_level: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceDeviation {
    pub fn new(
        instrument_id: impl Into<InstrumentId>,
        market_price: Price,
        theoretical_price: Price,
    ) -> Self {
        let deviation_percentage = if theoretical_price != 0.0 {
            (market_price - theoretical_price) / theoretical_price
        } else {
            0.0
        };
        Self {
            instrument_id: instrument_id.into(),
            market_price,
            theoretical_price,
            deviation_percentage,
            z_score: 0.0,
            confidence_level: 0.0,
            timestamp: Utc::now(),
        }
    }
}
