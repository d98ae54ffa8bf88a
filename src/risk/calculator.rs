//! Parametric risk metrics

use std::collections::{HashMap, VecDeque};

use crate::config::{
    DEFAULT_PAIRWISE_CORRELATION, DEFAULT_PORTFOLIO_SIGMA, ES_TO_VAR_RATIO,
    VAR_CONFIDENCE_MULTIPLIER,
};
use crate::types::{
    InstrumentId, MarketSnapshot, Position, RiskLevel, RiskParameters,
};
use crate::utils::{annualized_volatility, max_drawdown, pearson_correlation};

pub const RISK_HISTORY_CAP: usize = 250;

/// Parametric (variance-covariance) risk calculator. Volatilities and
/// correlations come from a rolling per-instrument mid history; pairs
/// without enough history fall back to conservative defaults.
pub struct RiskCalculator {
    price_history: HashMap<InstrumentId, VecDeque<f64>>,
}

impl RiskCalculator {
    pub fn new() -> Self {
        Self {
            price_history: HashMap::new(),
        }
    }

    pub fn update_price_history(&mut self, snapshot: &MarketSnapshot) {
        for (instrument, quote) in &snapshot.quotes {
            let history = self.price_history.entry(instrument.clone()).or_default();
            history.push_back(quote.mid());
            while history.len() > RISK_HISTORY_CAP {
                history.pop_front();
            }
        }
    }

    /// Daily volatility from the rolling history; conservative default
    /// when the history is too short.
    pub fn instrument_volatility(&self, instrument: &str) -> f64 {
        let Some(history) = self.price_history.get(instrument) else {
            return DEFAULT_PORTFOLIO_SIGMA;
        };
        if history.len() < 10 {
            return DEFAULT_PORTFOLIO_SIGMA;
        }
        let prices: Vec<f64> = history.iter().copied().collect();
        let annual = annualized_volatility(&prices);
        if annual <= 0.0 {
            DEFAULT_PORTFOLIO_SIGMA
        } else {
            annual / crate::utils::TRADING_DAYS_PER_YEAR.sqrt()
        }
    }

    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let (Some(xs), Some(ys)) = (self.price_history.get(a), self.price_history.get(b)) else {
            return DEFAULT_PAIRWISE_CORRELATION;
        };
        if xs.len() < 10 || ys.len() < 10 {
            return DEFAULT_PAIRWISE_CORRELATION;
        }
        let xs: Vec<f64> = xs.iter().copied().collect();
        let ys: Vec<f64> = ys.iter().copied().collect();
        pearson_correlation(&xs, &ys)
    }

    /// Parametric 1-day VaR at 95%: 1.65 * sigma * exposure.
    pub fn position_var(&self, position: &Position) -> f64 {
        let sigma = self.instrument_volatility(&position.instrument_id);
        VAR_CONFIDENCE_MULTIPLIER * sigma * position.exposure_amount.abs()
    }

    /// ES under normality is approximately 1.3x VaR.
    pub fn position_expected_shortfall(&self, position: &Position) -> f64 {
        self.position_var(position) * ES_TO_VAR_RATIO
    }

    /// Portfolio VaR via the correlation-scaled covariance of position
    /// exposures.
    pub fn portfolio_var(&self, positions: &[Position]) -> f64 {
        let mut variance = 0.0;
        for a in positions {
            for b in positions {
                let vol_a = self.instrument_volatility(&a.instrument_id);
                let vol_b = self.instrument_volatility(&b.instrument_id);
                variance += a.signed_exposure()
                    * b.signed_exposure()
                    * vol_a
                    * vol_b
                    * self.correlation(&a.instrument_id, &b.instrument_id);
            }
        }
        VAR_CONFIDENCE_MULTIPLIER * variance.max(0.0).sqrt()
    }

    /// Max pairwise |rho| across distinct position instruments.
    pub fn correlation_risk(&self, positions: &[Position]) -> f64 {
        let mut max_correlation = 0.0_f64;
        for (i, a) in positions.iter().enumerate() {
            for b in positions.iter().skip(i + 1) {
                if a.instrument_id == b.instrument_id {
                    continue;
                }
                max_correlation = max_correlation
                    .max(self.correlation(&a.instrument_id, &b.instrument_id).abs());
            }
        }
        max_correlation
    }

    pub fn maximum_drawdown(&self, pnl_history: &[f64]) -> f64 {
        max_drawdown(pnl_history)
    }

    pub fn assess_risk_level(&self, position: &Position, params: &RiskParameters) -> RiskLevel {
        let exposure = position.exposure_amount.abs();
        if exposure <= 0.0 {
            return RiskLevel::Low;
        }
        let var_ratio = self.position_var(position) / exposure;
        if var_ratio > params.max_individual_var * 8.0 {
            RiskLevel::Extreme
        } else if var_ratio > params.max_individual_var * 4.0 {
            RiskLevel::High
        } else if var_ratio > params.max_individual_var * 2.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl Default for RiskCalculator {
    fn default() -> Self {
        Self::new()
    }
}
