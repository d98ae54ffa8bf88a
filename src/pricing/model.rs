//! Shared pricing model contract

use std::collections::HashMap;

use crate::errors::EngineResult;
use crate::types::{InstrumentId, MarketSnapshot, Quote, SyntheticPrice};
use crate::utils::pearson_correlation;

#[derive(Debug, Clone)]
pub struct PricingParameters {
    pub correlation_threshold: f64,
    pub volatility_adjustment: f64,
    pub liquidity_penalty: f64,
    pub transaction_cost: f64,
    pub lookback_period: usize,
    pub confidence_interval: f64,
    /// Component quotes older than this are penalized in confidence scoring.
    pub staleness_budget_ms: i64,
    /// Component spreads wider than this are penalized in confidence scoring.
    pub max_spread_ratio: f64,
}

impl Default for PricingParameters {
    fn default() -> Self {
        Self {
            correlation_threshold: 0.8,
            volatility_adjustment: 0.05,
            liquidity_penalty: 0.001,
            transaction_cost: 0.0001,
            lookback_period: 100,
            confidence_interval: 0.95,
            staleness_budget_ms: 500,
            max_spread_ratio: 0.02,
        }
    }
}

/// Contract shared by all six pricing models.
pub trait PricingModel: Send {
    fn calculate_synthetic_price(
        &self,
        target_instrument: &InstrumentId,
        component_instruments: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> EngineResult<SyntheticPrice>;

    fn update_parameters(&mut self, params: PricingParameters);

    /// Models whose parameter state is snapshot-derived (funding tables,
    /// price histories) pull it from here; detection never happens in this
    /// step.
    fn ingest_snapshot(&mut self, _snapshot: &MarketSnapshot) {}

    fn calculate_weights(
        &self,
        instruments: &[InstrumentId],
        _snapshot: &MarketSnapshot,
    ) -> Vec<f64> {
        if instruments.is_empty() {
            return Vec::new();
        }
        vec![1.0 / instruments.len() as f64; instruments.len()]
    }

    /// Pearson correlation of mid prices over a shared quote history.
    fn calculate_correlation(
        &self,
        instrument1: &InstrumentId,
        instrument2: &InstrumentId,
        historical_data: &[Quote],
    ) -> f64 {
        let mut series: HashMap<&str, Vec<f64>> = HashMap::new();
        for quote in historical_data {
            if quote.instrument_id == *instrument1 || quote.instrument_id == *instrument2 {
                series
                    .entry(quote.instrument_id.as_str())
                    .or_default()
                    .push(quote.mid());
            }
        }
        let xs = series.get(instrument1.as_str());
        let ys = series.get(instrument2.as_str());
        match (xs, ys) {
            (Some(xs), Some(ys)) => pearson_correlation(xs, ys),
            _ => 0.0,
        }
    }
}
