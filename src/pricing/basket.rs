//! Weighted basket pricing and portfolio volatility

use std::collections::HashMap;

use crate::config::DEFAULT_PAIRWISE_CORRELATION;
use crate::errors::{EngineError, EngineResult};
use crate::pricing::confidence::component_confidence;
use crate::pricing::model::{PricingModel, PricingParameters};
use crate::types::{InstrumentId, MarketSnapshot, SyntheticPrice};

/// Synthetic basket price: exactly the weight-dot-mid sum over components.
pub struct BasketModel {
    params: PricingParameters,
    instrument_weights: HashMap<InstrumentId, f64>,
    volatilities: HashMap<InstrumentId, f64>,
    correlations: HashMap<(InstrumentId, InstrumentId), f64>,
}

impl BasketModel {
    pub fn new(params: PricingParameters) -> Self {
        Self {
            params,
            instrument_weights: HashMap::new(),
            volatilities: HashMap::new(),
            correlations: HashMap::new(),
        }
    }

    pub fn set_instrument_weights(&mut self, weights: HashMap<InstrumentId, f64>) {
        self.instrument_weights = weights;
    }

    pub fn set_volatility(&mut self, instrument: impl Into<InstrumentId>, vol: f64) {
        self.volatilities.insert(instrument.into(), vol.max(0.0));
    }

    pub fn set_correlation(
        &mut self,
        a: impl Into<InstrumentId>,
        b: impl Into<InstrumentId>,
        rho: f64,
    ) {
        self.correlations
            .insert((a.into(), b.into()), rho.clamp(-1.0, 1.0));
    }

    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.correlations
            .get(&(a.to_string(), b.to_string()))
            .or_else(|| self.correlations.get(&(b.to_string(), a.to_string())))
            .copied()
            .unwrap_or(DEFAULT_PAIRWISE_CORRELATION)
    }

    fn weights_for(&self, instruments: &[InstrumentId]) -> Vec<f64> {
        if instruments
            .iter()
            .all(|i| self.instrument_weights.contains_key(i))
            && !instruments.is_empty()
        {
            instruments
                .iter()
                .map(|i| self.instrument_weights[i])
                .collect()
        } else if instruments.is_empty() {
            Vec::new()
        } else {
            vec![1.0 / instruments.len() as f64; instruments.len()]
        }
    }

    /// sigma^2 = w' Sigma w with the correlation-scaled covariance built
    /// from per-instrument volatilities.
    pub fn portfolio_volatility(&self, instruments: &[InstrumentId], weights: &[f64]) -> f64 {
        let n = instruments.len().min(weights.len());
        let mut variance = 0.0;
        for i in 0..n {
            for j in 0..n {
                let vol_i = self.volatilities.get(&instruments[i]).copied().unwrap_or(0.0);
                let vol_j = self.volatilities.get(&instruments[j]).copied().unwrap_or(0.0);
                variance += weights[i]
                    * weights[j]
                    * vol_i
                    * vol_j
                    * self.correlation(&instruments[i], &instruments[j]);
            }
        }
        variance.max(0.0).sqrt()
    }
}

impl Default for BasketModel {
    fn default() -> Self {
        Self::new(PricingParameters::default())
    }
}

impl PricingModel for BasketModel {
    fn calculate_synthetic_price(
        &self,
        _target_instrument: &InstrumentId,
        component_instruments: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> EngineResult<SyntheticPrice> {
        if component_instruments.is_empty() {
            return Err(EngineError::model_domain("basket has no components"));
        }
        let weights = self.weights_for(component_instruments);

        let mut theoretical = 0.0;
        let mut bid = 0.0;
        let mut ask = 0.0;
        let mut quotes = Vec::with_capacity(component_instruments.len());
        for (instrument, weight) in component_instruments.iter().zip(&weights) {
            let quote = snapshot
                .quote(instrument)
                .ok_or_else(|| EngineError::UnknownInstrument(instrument.clone()))?;
            theoretical += weight * quote.mid();
            // A negative weight sells the component, so its bid contributes
            // to the basket ask and vice versa.
            if *weight >= 0.0 {
                bid += weight * quote.bid_price;
                ask += weight * quote.ask_price;
            } else {
                bid += weight * quote.ask_price;
                ask += weight * quote.bid_price;
            }
            quotes.push(quote);
        }

        let confidence = component_confidence(
            &quotes,
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            1,
            1,
        );

        Ok(SyntheticPrice::new(theoretical, bid, ask, confidence)
            .with_components(component_instruments.to_vec(), weights))
    }

    fn calculate_weights(
        &self,
        instruments: &[InstrumentId],
        _snapshot: &MarketSnapshot,
    ) -> Vec<f64> {
        self.weights_for(instruments)
    }

    fn update_parameters(&mut self, params: PricingParameters) {
        self.params = params;
    }
}
