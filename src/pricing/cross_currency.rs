//! Cross-currency synthetic pricing (A/C from A/B and B/C)

use std::collections::HashMap;

use crate::errors::{EngineError, EngineResult};
use crate::pricing::confidence::component_confidence;
use crate::pricing::model::{PricingModel, PricingParameters};
use crate::types::{InstrumentId, MarketSnapshot, Quote, SyntheticPrice};

/// Split "BTC-USD" / "BTC/USD" style ids into (base, quote).
pub fn parse_pair(instrument: &str) -> Option<(&str, &str)> {
    instrument
        .split_once('-')
        .or_else(|| instrument.split_once('/'))
}

/// One leg of a conversion chain, oriented from `from` to `to`. Selling
/// the base happens at the bid, so an inverted leg swaps and reciprocates
/// the sides.
struct OrientedRate {
    to: String,
    bid: f64,
    ask: f64,
    mid: f64,
}

fn orient(quote: &Quote, from: &str) -> EngineResult<OrientedRate> {
    let (base, counter) = parse_pair(&quote.instrument_id).ok_or_else(|| {
        EngineError::model_domain(format!("cannot parse pair {}", quote.instrument_id))
    })?;

    if base == from {
        Ok(OrientedRate {
            to: counter.to_string(),
            bid: quote.bid_price,
            ask: quote.ask_price,
            mid: quote.mid(),
        })
    } else if counter == from {
        if quote.bid_price <= 0.0 || quote.ask_price <= 0.0 {
            return Err(EngineError::model_domain(format!(
                "cannot invert one-sided quote {}",
                quote.instrument_id
            )));
        }
        Ok(OrientedRate {
            to: base.to_string(),
            bid: 1.0 / quote.ask_price,
            ask: 1.0 / quote.bid_price,
            mid: 1.0 / quote.mid(),
        })
    } else {
        Err(EngineError::model_domain(format!(
            "leg {} does not involve {from}",
            quote.instrument_id
        )))
    }
}

pub struct CrossCurrencyModel {
    params: PricingParameters,
    correlation_cache: HashMap<(InstrumentId, InstrumentId), f64>,
}

impl CrossCurrencyModel {
    pub fn new(params: PricingParameters) -> Self {
        Self {
            params,
            correlation_cache: HashMap::new(),
        }
    }

    pub fn cache_correlation(
        &mut self,
        a: impl Into<InstrumentId>,
        b: impl Into<InstrumentId>,
        rho: f64,
    ) {
        self.correlation_cache
            .insert((a.into(), b.into()), rho.clamp(-1.0, 1.0));
    }

    pub fn cached_correlation(&self, a: &str, b: &str) -> Option<f64> {
        self.correlation_cache
            .get(&(a.to_string(), b.to_string()))
            .or_else(|| self.correlation_cache.get(&(b.to_string(), a.to_string())))
            .copied()
    }
}

impl Default for CrossCurrencyModel {
    fn default() -> Self {
        Self::new(PricingParameters::default())
    }
}

impl PricingModel for CrossCurrencyModel {
    fn calculate_synthetic_price(
        &self,
        target_instrument: &InstrumentId,
        component_instruments: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> EngineResult<SyntheticPrice> {
        let [leg1_id, leg2_id] = component_instruments else {
            return Err(EngineError::model_domain(
                "cross-currency model needs exactly two legs",
            ));
        };
        let (target_base, target_quote) = parse_pair(target_instrument).ok_or_else(|| {
            EngineError::model_domain(format!("cannot parse target pair {target_instrument}"))
        })?;

        let leg1 = snapshot
            .quote(leg1_id)
            .ok_or_else(|| EngineError::UnknownInstrument(leg1_id.clone()))?;
        let leg2 = snapshot
            .quote(leg2_id)
            .ok_or_else(|| EngineError::UnknownInstrument(leg2_id.clone()))?;

        let first = orient(leg1, target_base)?;
        let second = orient(leg2, &first.to)?;
        if second.to != target_quote {
            return Err(EngineError::model_domain(format!(
                "legs {leg1_id}, {leg2_id} do not chain into {target_instrument}"
            )));
        }

        let confidence = component_confidence(
            &[leg1, leg2],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            1,
            1,
        );

        Ok(SyntheticPrice::new(
            first.mid * second.mid,
            first.bid * second.bid,
            first.ask * second.ask,
            confidence,
        )
        .with_components(vec![leg1_id.clone(), leg2_id.clone()], vec![1.0, 1.0]))
    }

    fn update_parameters(&mut self, params: PricingParameters) {
        self.params = params;
    }
}
