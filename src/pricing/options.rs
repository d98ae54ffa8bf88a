//! Options pricing on an implied volatility surface

use std::collections::HashMap;

use crate::errors::{EngineError, EngineResult};
use crate::pricing::black_scholes::{self, BsInputs, Greeks};
use crate::pricing::confidence::component_confidence;
use crate::pricing::model::{PricingModel, PricingParameters};
use crate::pricing::vol_surface::VolatilitySurface;
use crate::types::{InstrumentId, MarketSnapshot, Quote, SyntheticPrice};

#[derive(Debug, Clone)]
pub struct OptionContract {
    pub underlying: InstrumentId,
    pub strike: f64,
    pub time_to_expiry: f64,
    pub is_call: bool,
}

pub struct OptionsModel {
    params: PricingParameters,
    surfaces: HashMap<InstrumentId, VolatilitySurface>,
    risk_free_rates: HashMap<InstrumentId, f64>,
    contracts: HashMap<InstrumentId, OptionContract>,
}

impl OptionsModel {
    pub fn new(params: PricingParameters) -> Self {
        Self {
            params,
            surfaces: HashMap::new(),
            risk_free_rates: HashMap::new(),
            contracts: HashMap::new(),
        }
    }

    pub fn add_contract(&mut self, option: impl Into<InstrumentId>, contract: OptionContract) {
        self.contracts.insert(option.into(), contract);
    }

    pub fn update_volatility_surface(
        &mut self,
        underlying: impl Into<InstrumentId>,
        surface: VolatilitySurface,
    ) {
        self.surfaces.insert(underlying.into(), surface);
    }

    pub fn set_risk_free_rate(&mut self, underlying: impl Into<InstrumentId>, rate: f64) {
        self.risk_free_rates.insert(underlying.into(), rate);
    }

    fn contract(&self, option: &str) -> EngineResult<&OptionContract> {
        self.contracts
            .get(option)
            .ok_or_else(|| EngineError::UnknownInstrument(option.to_string()))
    }

    fn inputs_for(&self, option: &str, spot: f64) -> EngineResult<BsInputs> {
        let contract = self.contract(option)?;
        if contract.time_to_expiry <= 0.0 {
            return Err(EngineError::model_domain(format!(
                "option {option} has non-positive time to expiry"
            )));
        }

        let vol = self
            .surfaces
            .get(&contract.underlying)
            .map(|s| s.interpolate_volatility(contract.strike, contract.time_to_expiry))
            .unwrap_or(crate::config::DEFAULT_VOLATILITY);
        if vol <= 0.0 {
            return Err(EngineError::model_domain(format!(
                "non-positive volatility for {option}"
            )));
        }

        Ok(BsInputs {
            spot,
            strike: contract.strike,
            time: contract.time_to_expiry,
            vol,
            rate: self
                .risk_free_rates
                .get(&contract.underlying)
                .copied()
                .unwrap_or(0.0),
            is_call: contract.is_call,
        })
    }

    pub fn calculate_greeks(&self, option: &str, spot_quote: &Quote) -> EngineResult<Greeks> {
        let inputs = self.inputs_for(option, spot_quote.mid())?;
        Ok(black_scholes::greeks(&inputs))
    }

    /// Implied volatility recovered from a market quote by bisection.
    pub fn implied_volatility(
        &self,
        option: &str,
        market_quote: &Quote,
        spot_quote: &Quote,
    ) -> EngineResult<f64> {
        let inputs = self.inputs_for(option, spot_quote.mid())?;
        black_scholes::implied_volatility(market_quote.mid(), &inputs).ok_or_else(|| {
            EngineError::model_domain(format!(
                "market price of {option} is outside the model's volatility range"
            ))
        })
    }
}

impl Default for OptionsModel {
    fn default() -> Self {
        Self::new(PricingParameters::default())
    }
}

impl PricingModel for OptionsModel {
    fn calculate_synthetic_price(
        &self,
        target_instrument: &InstrumentId,
        component_instruments: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> EngineResult<SyntheticPrice> {
        let spot_id = component_instruments
            .first()
            .ok_or_else(|| EngineError::model_domain("options model needs a spot component"))?;
        let spot = snapshot
            .quote(spot_id)
            .ok_or_else(|| EngineError::UnknownInstrument(spot_id.clone()))?;

        let mid_inputs = self.inputs_for(target_instrument, spot.mid())?;
        let bid_inputs = BsInputs {
            spot: spot.bid_price,
            ..mid_inputs
        };
        let ask_inputs = BsInputs {
            spot: spot.ask_price,
            ..mid_inputs
        };

        let confidence = component_confidence(
            &[spot],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            1,
            1,
        );

        // A call rises with spot, a put falls: order the quote accordingly.
        let (low, high) = if mid_inputs.is_call {
            (black_scholes::price(&bid_inputs), black_scholes::price(&ask_inputs))
        } else {
            (black_scholes::price(&ask_inputs), black_scholes::price(&bid_inputs))
        };

        Ok(SyntheticPrice::new(
            black_scholes::price(&mid_inputs),
            low,
            high,
            confidence,
        )
        .with_components(vec![spot_id.clone()], vec![1.0]))
    }

    fn update_parameters(&mut self, params: PricingParameters) {
        self.params = params;
    }
}
