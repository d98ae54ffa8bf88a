//! Mean-reversion pricing from rolling price history

use std::collections::{HashMap, VecDeque};

use crate::errors::{EngineError, EngineResult};
use crate::pricing::confidence::{component_confidence, sample_score};
use crate::pricing::model::{PricingModel, PricingParameters};
use crate::types::{InstrumentId, MarketSnapshot, Quote, SyntheticPrice};
use crate::utils::{mean, sample_std_dev};

pub const BOLLINGER_BAND_WIDTH: f64 = 2.0;

/// Rolling-mean reversion price with Bollinger bands as the quote edges.
pub struct StatArbModel {
    params: PricingParameters,
    price_history: HashMap<InstrumentId, VecDeque<f64>>,
}

impl StatArbModel {
    pub fn new(params: PricingParameters) -> Self {
        Self {
            params,
            price_history: HashMap::new(),
        }
    }

    pub fn update_price_history(&mut self, instrument: &str, quote: &Quote) {
        let history = self
            .price_history
            .entry(instrument.to_string())
            .or_default();
        history.push_back(quote.mid());
        while history.len() > self.params.lookback_period {
            history.pop_front();
        }
    }

    pub fn history_len(&self, instrument: &str) -> usize {
        self.price_history.get(instrument).map_or(0, VecDeque::len)
    }

    fn history(&self, instrument: &str) -> EngineResult<Vec<f64>> {
        let history = self.price_history.get(instrument);
        let available = history.map_or(0, VecDeque::len);
        if available < 2 {
            return Err(EngineError::InsufficientHistory {
                instrument: instrument.to_string(),
                required: 2,
                available,
            });
        }
        Ok(history.unwrap().iter().copied().collect())
    }

    pub fn mean_reversion_price(&self, instrument: &str) -> EngineResult<f64> {
        Ok(mean(&self.history(instrument)?))
    }

    pub fn volatility(&self, instrument: &str) -> EngineResult<f64> {
        Ok(sample_std_dev(&self.history(instrument)?))
    }

    /// (upper, lower) bands at `width` standard deviations.
    pub fn bollinger_bands(&self, instrument: &str, width: f64) -> EngineResult<(f64, f64)> {
        let prices = self.history(instrument)?;
        let m = mean(&prices);
        let sd = sample_std_dev(&prices);
        Ok((m + width * sd, m - width * sd))
    }
}

impl Default for StatArbModel {
    fn default() -> Self {
        Self::new(PricingParameters::default())
    }
}

impl PricingModel for StatArbModel {
    fn calculate_synthetic_price(
        &self,
        target_instrument: &InstrumentId,
        _component_instruments: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> EngineResult<SyntheticPrice> {
        let theoretical = self.mean_reversion_price(target_instrument)?;
        let (upper, lower) = self.bollinger_bands(target_instrument, BOLLINGER_BAND_WIDTH)?;

        let mut confidence = sample_score(
            self.history_len(target_instrument),
            self.params.lookback_period,
        );
        if let Some(quote) = snapshot.quote(target_instrument) {
            confidence = confidence.min(component_confidence(
                &[quote],
                snapshot.snapshot_time,
                self.params.staleness_budget_ms,
                self.params.max_spread_ratio,
                self.history_len(target_instrument),
                self.params.lookback_period,
            ));
        }

        Ok(SyntheticPrice::new(theoretical, lower, upper, confidence)
            .with_components(vec![target_instrument.clone()], vec![1.0]))
    }

    fn update_parameters(&mut self, params: PricingParameters) {
        self.params = params;
    }

    fn ingest_snapshot(&mut self, snapshot: &MarketSnapshot) {
        let instruments: Vec<_> = snapshot.quotes.keys().cloned().collect();
        for instrument in instruments {
            let quote = snapshot.quotes[&instrument].clone();
            self.update_price_history(&instrument, &quote);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_history(model: &mut StatArbModel, instrument: &str, prices: &[f64]) {
        for price in prices {
            let quote = Quote::new(instrument, price - 0.5, price + 0.5, 1.0, 1.0);
            model.update_price_history(instrument, &quote);
        }
    }

    #[test]
    fn reversion_price_is_the_rolling_mean() {
        let mut model = StatArbModel::default();
        fill_history(&mut model, "BTC-USD", &[100.0, 102.0, 98.0, 100.0]);
        assert!((model.mean_reversion_price("BTC-USD").unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn bands_bracket_the_mean_symmetrically() {
        let mut model = StatArbModel::default();
        fill_history(&mut model, "BTC-USD", &[100.0, 102.0, 98.0, 100.0]);
        let (upper, lower) = model.bollinger_bands("BTC-USD", 2.0).unwrap();
        let m = model.mean_reversion_price("BTC-USD").unwrap();
        assert!((upper - m) > 0.0);
        assert!(((upper - m) - (m - lower)).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded_by_lookback() {
        let params = PricingParameters {
            lookback_period: 10,
            ..PricingParameters::default()
        };
        let mut model = StatArbModel::new(params);
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        fill_history(&mut model, "BTC-USD", &prices);
        assert_eq!(model.history_len("BTC-USD"), 10);
        // Only the last 10 prices survive.
        assert!((model.mean_reversion_price("BTC-USD").unwrap() - 144.5).abs() < 1e-9);
    }

    #[test]
    fn empty_history_is_insufficient() {
        let model = StatArbModel::default();
        assert!(matches!(
            model.mean_reversion_price("BTC-USD"),
            Err(EngineError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn confidence_reflects_sample_size() {
        let mut model = StatArbModel::default();
        // 50 of 100 lookback samples.
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + (i % 5) as f64).collect();
        fill_history(&mut model, "BTC-USD", &prices);
        let snapshot = MarketSnapshot::empty();
        let synth = model
            .calculate_synthetic_price(&"BTC-USD".to_string(), &[], &snapshot)
            .unwrap();
        assert!((synth.confidence_score - 0.5).abs() < 1e-9);
    }
}
