//! Position sizing

use crate::config::{KELLY_FRACTION_CAP, TARGET_VOLATILITY, VAR_CONFIDENCE_MULTIPLIER};
use crate::types::{MispricingOpportunity, RiskParameters, Volume};

/// Candidate sizes considered for an opportunity; the final size is the
/// minimum over all of them, then leverage- and correlation-adjusted.
#[derive(Debug, Clone)]
pub struct SizingInputs {
    pub portfolio_value: f64,
    pub entry_price: f64,
    pub win_probability: f64,
    /// Win/loss payoff ratio (odds).
    pub odds: f64,
    pub instrument_volatility: f64,
    pub num_legs: usize,
    pub current_leverage: f64,
    pub correlation_exposure: f64,
}

pub struct PositionSizer {
    risk_params: RiskParameters,
}

impl PositionSizer {
    pub fn new(risk_params: RiskParameters) -> Self {
        Self { risk_params }
    }

    pub fn update_parameters(&mut self, risk_params: RiskParameters) {
        self.risk_params = risk_params;
    }

    /// Kelly fraction f* = (p*b - q)/b clipped to [0, 0.25], converted to
    /// units at the entry price.
    pub fn kelly_size(
        &self,
        win_probability: f64,
        odds: f64,
        portfolio_value: f64,
        entry_price: f64,
    ) -> Volume {
        if odds <= 0.0 || entry_price <= 0.0 {
            return 0.0;
        }
        let p = win_probability.clamp(0.0, 1.0);
        let q = 1.0 - p;
        let fraction = ((p * odds - q) / odds).clamp(0.0, KELLY_FRACTION_CAP);
        fraction * portfolio_value / entry_price
    }

    /// Largest size whose parametric VaR stays inside the individual
    /// position budget.
    pub fn var_based_size(
        &self,
        instrument_volatility: f64,
        portfolio_value: f64,
        entry_price: f64,
    ) -> Volume {
        if entry_price <= 0.0 {
            return 0.0;
        }
        let per_unit_var =
            VAR_CONFIDENCE_MULTIPLIER * instrument_volatility.max(1e-6) * entry_price;
        self.risk_params.max_individual_var * portfolio_value / per_unit_var
    }

    /// Scale a base size so realized volatility lands on the target.
    pub fn volatility_adjusted_size(
        &self,
        instrument_volatility: f64,
        target_volatility: f64,
        base_size: Volume,
    ) -> Volume {
        if instrument_volatility <= 0.0 {
            return base_size;
        }
        base_size * target_volatility / instrument_volatility
    }

    /// Equal risk budget per leg of a multi-leg package.
    pub fn risk_parity_size(
        &self,
        portfolio_value: f64,
        entry_price: f64,
        num_legs: usize,
    ) -> Volume {
        if entry_price <= 0.0 {
            return 0.0;
        }
        let legs = num_legs.max(1) as f64;
        self.risk_params.max_position_size_percentage * portfolio_value / (entry_price * legs)
    }

    /// Mean-variance (Sharpe-optimal) fraction er / sigma^2, capped by the
    /// per-position budget.
    pub fn sharpe_optimal_size(
        &self,
        expected_return: f64,
        instrument_volatility: f64,
        portfolio_value: f64,
        entry_price: f64,
    ) -> Volume {
        if entry_price <= 0.0 || instrument_volatility <= 0.0 {
            return 0.0;
        }
        let fraction = (expected_return / (instrument_volatility * instrument_volatility))
            .clamp(0.0, self.risk_params.max_position_size_percentage);
        fraction * portfolio_value / entry_price
    }

    pub fn leverage_adjusted_size(&self, base_size: Volume, current_leverage: f64) -> Volume {
        if current_leverage <= self.risk_params.max_leverage || current_leverage <= 0.0 {
            return base_size;
        }
        base_size * self.risk_params.max_leverage / current_leverage
    }

    pub fn correlation_adjusted_size(&self, base_size: Volume, correlation_exposure: f64) -> Volume {
        if self.risk_params.max_correlation_risk <= 0.0 {
            return base_size;
        }
        let scale =
            (1.0 - correlation_exposure / self.risk_params.max_correlation_risk).clamp(0.0, 1.0);
        base_size * scale
    }

    /// Final size: min over the candidate sizes, then leverage and
    /// correlation adjustments.
    pub fn optimal_size(&self, inputs: &SizingInputs) -> Volume {
        let kelly = self.kelly_size(
            inputs.win_probability,
            inputs.odds,
            inputs.portfolio_value,
            inputs.entry_price,
        );
        let var_bounded = self.var_based_size(
            inputs.instrument_volatility,
            inputs.portfolio_value,
            inputs.entry_price,
        );
        let parity = self.risk_parity_size(
            inputs.portfolio_value,
            inputs.entry_price,
            inputs.num_legs,
        );
        let vol_targeted = self.volatility_adjusted_size(
            inputs.instrument_volatility,
            TARGET_VOLATILITY,
            parity,
        );
        let expected_return =
            inputs.win_probability * inputs.odds - (1.0 - inputs.win_probability);
        let sharpe = self.sharpe_optimal_size(
            expected_return.max(0.0),
            inputs.instrument_volatility,
            inputs.portfolio_value,
            inputs.entry_price,
        );

        let base = kelly
            .min(var_bounded)
            .min(parity)
            .min(vol_targeted)
            .min(sharpe);
        let levered = self.leverage_adjusted_size(base, inputs.current_leverage);
        self.correlation_adjusted_size(levered, inputs.correlation_exposure)
            .max(0.0)
    }

    /// Sizing inputs derived from a mispricing: the confidence level is
    /// the win probability and expected-profit/max-loss the odds.
    pub fn inputs_from_mispricing(
        &self,
        mispricing: &MispricingOpportunity,
        portfolio_value: f64,
        entry_price: f64,
        instrument_volatility: f64,
    ) -> SizingInputs {
        let odds = if mispricing.max_loss > 0.0 {
            mispricing.expected_profit / mispricing.max_loss
        } else {
            1.0
        };
        SizingInputs {
            portfolio_value,
            entry_price,
            win_probability: mispricing.confidence_level,
            odds: odds.max(1e-6),
            instrument_volatility,
            num_legs: mispricing.component_instruments.len() + 1,
            current_leverage: 0.0,
            correlation_exposure: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> PositionSizer {
        PositionSizer::new(RiskParameters::default())
    }

    #[test]
    fn kelly_fraction_is_capped_at_a_quarter() {
        // p=0.9, b=3 -> f* = (2.7 - 0.1)/3 = 0.8667, capped to 0.25.
        let size = sizer().kelly_size(0.9, 3.0, 1_000_000.0, 100.0);
        assert!((size - 0.25 * 1_000_000.0 / 100.0).abs() < 1e-9);
    }

    #[test]
    fn negative_edge_kelly_is_zero() {
        // p=0.4, b=1 -> f* = -0.2, clipped to 0.
        assert_eq!(sizer().kelly_size(0.4, 1.0, 1_000_000.0, 100.0), 0.0);
    }

    #[test]
    fn var_bound_shrinks_with_volatility() {
        let s = sizer();
        let calm = s.var_based_size(0.02, 1_000_000.0, 100.0);
        let wild = s.var_based_size(0.10, 1_000_000.0, 100.0);
        assert!(calm > wild);
        // size * per-unit VaR == budget exactly.
        let budget = 0.01 * 1_000_000.0;
        assert!((wild * VAR_CONFIDENCE_MULTIPLIER * 0.10 * 100.0 - budget).abs() < 1e-6);
    }

    #[test]
    fn volatility_targeting_scales_base() {
        let s = sizer();
        assert!((s.volatility_adjusted_size(0.20, 0.10, 100.0) - 50.0).abs() < 1e-9);
        assert!((s.volatility_adjusted_size(0.05, 0.10, 100.0) - 200.0).abs() < 1e-9);
        assert_eq!(s.volatility_adjusted_size(0.0, 0.10, 100.0), 100.0);
    }

    #[test]
    fn risk_parity_splits_budget_across_legs() {
        let s = sizer();
        let single = s.risk_parity_size(1_000_000.0, 100.0, 1);
        let triple = s.risk_parity_size(1_000_000.0, 100.0, 3);
        assert!((single - 500.0).abs() < 1e-9);
        assert!((triple - single / 3.0).abs() < 1e-9);
    }

    #[test]
    fn sharpe_size_is_capped_by_the_position_budget() {
        let s = sizer();
        // Huge edge over tiny variance: the 5% budget cap binds.
        let capped = s.sharpe_optimal_size(2.0, 0.05, 1_000_000.0, 100.0);
        assert!((capped - 0.05 * 1_000_000.0 / 100.0).abs() < 1e-9);
        // Small edge over large variance stays below the cap.
        let modest = s.sharpe_optimal_size(0.01, 0.8, 1_000_000.0, 100.0);
        assert!(modest < capped);
        assert_eq!(s.sharpe_optimal_size(1.0, 0.0, 1_000_000.0, 100.0), 0.0);
    }

    #[test]
    fn leverage_cap_only_binds_above_max() {
        let s = sizer();
        assert_eq!(s.leverage_adjusted_size(100.0, 2.0), 100.0);
        assert!((s.leverage_adjusted_size(100.0, 6.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn correlation_scaling_fades_to_zero_at_the_limit() {
        let s = sizer();
        assert_eq!(s.correlation_adjusted_size(100.0, 0.0), 100.0);
        assert!((s.correlation_adjusted_size(100.0, 0.15) - 50.0).abs() < 1e-9);
        assert_eq!(s.correlation_adjusted_size(100.0, 0.3), 0.0);
        assert_eq!(s.correlation_adjusted_size(100.0, 0.5), 0.0);
    }

    #[test]
    fn optimal_size_is_bounded_by_every_candidate() {
        let s = sizer();
        let inputs = SizingInputs {
            portfolio_value: 1_000_000.0,
            entry_price: 100.0,
            win_probability: 0.85,
            odds: 2.0,
            instrument_volatility: 0.05,
            num_legs: 2,
            current_leverage: 1.0,
            correlation_exposure: 0.1,
        };
        let size = s.optimal_size(&inputs);
        assert!(size > 0.0);
        assert!(
            size <= s.kelly_size(0.85, 2.0, 1_000_000.0, 100.0) + 1e-9
        );
        assert!(size <= s.var_based_size(0.05, 1_000_000.0, 100.0) + 1e-9);
        assert!(size <= s.risk_parity_size(1_000_000.0, 100.0, 2) + 1e-9);
    }
}
