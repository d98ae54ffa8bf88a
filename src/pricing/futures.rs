//! Cost-of-carry forward pricing

use std::collections::HashMap;

use crate::config::DEFAULT_TIME_TO_MATURITY_YEARS;
use crate::errors::{EngineError, EngineResult};
use crate::pricing::confidence::component_confidence;
use crate::pricing::model::{PricingModel, PricingParameters};
use crate::types::{InstrumentId, MarketSnapshot, Quote, SyntheticPrice};

/// Forward = spot_mid * exp((r - q) * tau) where r is the risk-free rate,
/// q the dividend/borrow yield, tau the time to maturity in years.
pub struct CostOfCarryModel {
    params: PricingParameters,
    interest_rates: HashMap<InstrumentId, f64>,
    dividend_yields: HashMap<InstrumentId, f64>,
    maturities: HashMap<InstrumentId, f64>,
}

impl CostOfCarryModel {
    pub fn new(params: PricingParameters) -> Self {
        Self {
            params,
            interest_rates: HashMap::new(),
            dividend_yields: HashMap::new(),
            maturities: HashMap::new(),
        }
    }

    pub fn set_interest_rate(&mut self, instrument: impl Into<InstrumentId>, rate: f64) {
        self.interest_rates.insert(instrument.into(), rate);
    }

    pub fn set_dividend_yield(&mut self, instrument: impl Into<InstrumentId>, yield_rate: f64) {
        self.dividend_yields.insert(instrument.into(), yield_rate);
    }

    pub fn set_time_to_maturity(&mut self, instrument: impl Into<InstrumentId>, years: f64) {
        self.maturities.insert(instrument.into(), years);
    }

    pub fn cost_of_carry(&self, instrument: &str) -> f64 {
        let r = self.interest_rates.get(instrument).copied().unwrap_or(0.0);
        let q = self.dividend_yields.get(instrument).copied().unwrap_or(0.0);
        r - q
    }

    fn time_to_maturity(&self, instrument: &str) -> EngineResult<f64> {
        let tau = self
            .maturities
            .get(instrument)
            .copied()
            .unwrap_or(DEFAULT_TIME_TO_MATURITY_YEARS);
        if tau < 0.0 {
            return Err(EngineError::model_domain(format!(
                "negative time to maturity for {instrument}"
            )));
        }
        Ok(tau)
    }

    pub fn forward_price(&self, instrument: &str, spot_quote: &Quote) -> EngineResult<f64> {
        let tau = self.time_to_maturity(instrument)?;
        Ok(spot_quote.mid() * (self.cost_of_carry(instrument) * tau).exp())
    }

    /// Basis = quoted future - model forward.
    pub fn calculate_basis(
        &self,
        futures_instrument: &str,
        spot_quote: &Quote,
        futures_quote: &Quote,
    ) -> EngineResult<f64> {
        Ok(futures_quote.mid() - self.forward_price(futures_instrument, spot_quote)?)
    }
}

impl Default for CostOfCarryModel {
    fn default() -> Self {
        Self::new(PricingParameters::default())
    }
}

impl PricingModel for CostOfCarryModel {
    fn calculate_synthetic_price(
        &self,
        target_instrument: &InstrumentId,
        component_instruments: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> EngineResult<SyntheticPrice> {
        let spot_id = component_instruments
            .first()
            .ok_or_else(|| EngineError::model_domain("carry model needs a spot component"))?;
        let spot = snapshot
            .quote(spot_id)
            .ok_or_else(|| EngineError::UnknownInstrument(spot_id.clone()))?;

        let tau = self.time_to_maturity(target_instrument)?;
        let growth = (self.cost_of_carry(target_instrument) * tau).exp();

        let confidence = component_confidence(
            &[spot],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            1,
            1,
        );

        Ok(SyntheticPrice::new(
            spot.mid() * growth,
            spot.bid_price * growth,
            spot.ask_price * growth,
            confidence,
        )
        .with_components(vec![spot_id.clone()], vec![1.0]))
    }

    fn update_parameters(&mut self, params: PricingParameters) {
        self.params = params;
    }
}
