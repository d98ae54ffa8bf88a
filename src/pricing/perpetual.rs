//! Perpetual swap pricing via funding-rate basis

use std::collections::HashMap;

use crate::config::DEFAULT_FUNDING_RATE;
use crate::errors::{EngineError, EngineResult};
use crate::pricing::confidence::component_confidence;
use crate::pricing::model::{PricingModel, PricingParameters};
use crate::types::{FundingRate, InstrumentId, MarketSnapshot, Quote, SyntheticPrice, Volume};

/// Fair value of a perpetual anchored to spot by the funding rate:
/// spot_mid * (1 + funding_rate).
pub struct PerpetualSwapModel {
    params: PricingParameters,
    funding_rates: HashMap<InstrumentId, FundingRate>,
}

impl PerpetualSwapModel {
    pub fn new(params: PricingParameters) -> Self {
        Self {
            params,
            funding_rates: HashMap::new(),
        }
    }

    pub fn update_funding_rate(&mut self, instrument: impl Into<InstrumentId>, rate: FundingRate) {
        self.funding_rates.insert(instrument.into(), rate);
    }

    pub fn get_current_funding_rate(&self, instrument: &str) -> f64 {
        self.funding_rates
            .get(instrument)
            .map(|f| f.rate)
            .unwrap_or(DEFAULT_FUNDING_RATE)
    }

    pub fn calculate_funding_payment(&self, instrument: &str, position_size: Volume) -> f64 {
        self.get_current_funding_rate(instrument) * position_size
    }

    pub fn fair_value(&self, spot_quote: &Quote, funding_rate: f64) -> f64 {
        spot_quote.mid() * (1.0 + funding_rate)
    }

    /// Basis = perpetual mid - spot mid.
    pub fn basis(&self, spot_quote: &Quote, perpetual_quote: &Quote) -> f64 {
        perpetual_quote.mid() - spot_quote.mid()
    }
}

impl Default for PerpetualSwapModel {
    fn default() -> Self {
        Self::new(PricingParameters::default())
    }
}

impl PricingModel for PerpetualSwapModel {
    fn calculate_synthetic_price(
        &self,
        target_instrument: &InstrumentId,
        component_instruments: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> EngineResult<SyntheticPrice> {
        let spot_id = component_instruments
            .first()
            .ok_or_else(|| EngineError::model_domain("perpetual model needs a spot component"))?;
        let spot = snapshot
            .quote(spot_id)
            .ok_or_else(|| EngineError::UnknownInstrument(spot_id.clone()))?;

        let funding = self
            .funding_rates
            .get(target_instrument)
            .map(|f| f.rate)
            .or_else(|| snapshot.funding_rate(target_instrument))
            .unwrap_or(DEFAULT_FUNDING_RATE);

        let factor = 1.0 + funding;
        let confidence = component_confidence(
            &[spot],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            1,
            1,
        );

        Ok(SyntheticPrice::new(
            spot.mid() * factor,
            spot.bid_price * factor,
            spot.ask_price * factor,
            confidence,
        )
        .with_components(vec![spot_id.clone()], vec![1.0]))
    }

    fn update_parameters(&mut self, params: PricingParameters) {
        self.params = params;
    }

    fn ingest_snapshot(&mut self, snapshot: &MarketSnapshot) {
        for (instrument, rate) in &snapshot.funding_rates {
            self.funding_rates.insert(instrument.clone(), rate.clone());
        }
    }
}
