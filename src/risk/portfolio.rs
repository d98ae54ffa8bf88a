//! Portfolio state, aggregate metrics, and limit enforcement

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::risk::calculator::RiskCalculator;
use crate::types::{
    ArbitrageOpportunity, MarketSnapshot, Position, PositionSide, RiskParameters, Side,
};
use crate::utils::{mean, sample_std_dev};

pub const PNL_HISTORY_CAP: usize = 500;

/// Owns the portfolio: opens positions from validated opportunities,
/// marks them against snapshots, aggregates exposure/VaR/Sharpe, and
/// halves everything when a risk limit is breached.
pub struct PortfolioManager {
    risk_params: RiskParameters,
    positions: Mutex<Vec<Position>>,
    pnl_history: Mutex<VecDeque<f64>>,
    portfolio_value: f64,
}

impl PortfolioManager {
    pub fn new(risk_params: RiskParameters, portfolio_value: f64) -> Self {
        Self {
            risk_params,
            positions: Mutex::new(Vec::new()),
            pnl_history: Mutex::new(VecDeque::new()),
            portfolio_value,
        }
    }

    pub fn set_risk_parameters(&mut self, params: RiskParameters) {
        self.risk_params = params;
    }

    /// One position per leg of a validated opportunity. Returns the new
    /// position ids.
    pub fn execute_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Vec<String> {
        let mut ids = Vec::with_capacity(opportunity.legs.len());
        let mut positions = self.positions.lock().unwrap();
        for leg in &opportunity.legs {
            let side = match leg.side {
                Side::Bid => PositionSide::Long,
                Side::Ask => PositionSide::Short,
            };
            let id = format!("POS_{}", Uuid::new_v4().simple());
            positions.push(Position::new(
                id.clone(),
                leg.instrument_id.clone(),
                side,
                leg.size,
                leg.entry_price,
            ));
            ids.push(id);
        }
        ids
    }

    pub fn close_position(&self, position_id: &str) -> Option<Position> {
        let mut positions = self.positions.lock().unwrap();
        let index = positions.iter().position(|p| p.position_id == position_id)?;
        let mut closed = positions.remove(index);
        closed.realized_pnl += closed.unrealized_pnl;
        closed.unrealized_pnl = 0.0;
        Some(closed)
    }

    /// Mark every position against the snapshot and record total P&L.
    pub fn update_market_data(&self, snapshot: &MarketSnapshot) {
        let now = Utc::now();
        let mut positions = self.positions.lock().unwrap();
        for position in positions.iter_mut() {
            if let Some(mid) = snapshot.mid(&position.instrument_id) {
                position.mark(mid, now);
            }
        }
        let total_pnl: f64 = positions
            .iter()
            .map(|p| p.unrealized_pnl + p.realized_pnl)
            .sum();
        drop(positions);

        let mut history = self.pnl_history.lock().unwrap();
        history.push_back(total_pnl);
        while history.len() > PNL_HISTORY_CAP {
            history.pop_front();
        }
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.lock().unwrap().clone()
    }

    pub fn gross_exposure(&self) -> f64 {
        self.positions
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.signed_exposure().abs())
            .sum()
    }

    pub fn net_exposure(&self) -> f64 {
        self.positions
            .lock()
            .unwrap()
            .iter()
            .map(Position::signed_exposure)
            .sum()
    }

    pub fn total_pnl(&self) -> f64 {
        self.positions
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.unrealized_pnl + p.realized_pnl)
            .sum()
    }

    pub fn portfolio_var(&self, calculator: &RiskCalculator) -> f64 {
        calculator.portfolio_var(&self.positions())
    }

    /// Sharpe from the rolling P&L increments (annualization-free, the
    /// cadence of marks is the period).
    pub fn sharpe_ratio(&self) -> f64 {
        let history = self.pnl_history.lock().unwrap();
        if history.len() < 3 {
            return 0.0;
        }
        let increments: Vec<f64> = history
            .iter()
            .zip(history.iter().skip(1))
            .map(|(a, b)| b - a)
            .collect();
        let sd = sample_std_dev(&increments);
        if sd > 0.0 {
            mean(&increments) / sd
        } else {
            0.0
        }
    }

    pub fn current_leverage(&self) -> f64 {
        if self.portfolio_value > 0.0 {
            self.gross_exposure() / self.portfolio_value
        } else {
            0.0
        }
    }

    /// Every currently breached limit, by name.
    pub fn risk_violations(&self, calculator: &RiskCalculator) -> Vec<String> {
        let mut violations = Vec::new();
        let positions = self.positions();

        let max_position_value =
            self.risk_params.max_position_size_percentage * self.portfolio_value;
        for position in &positions {
            if position.signed_exposure().abs() > max_position_value {
                violations.push(format!(
                    "position {} exceeds size limit ({:.0} > {:.0})",
                    position.position_id,
                    position.signed_exposure().abs(),
                    max_position_value
                ));
            }
        }

        let var = calculator.portfolio_var(&positions);
        if var > self.risk_params.max_portfolio_var * self.portfolio_value {
            violations.push(format!("portfolio VaR {:.0} over limit", var));
        }

        let correlation = calculator.correlation_risk(&positions);
        if correlation > self.risk_params.max_correlation_risk {
            violations.push(format!("correlation risk {:.2} over limit", correlation));
        }

        if self.current_leverage() > self.risk_params.max_leverage {
            violations.push(format!(
                "leverage {:.2} over {:.2} cap",
                self.current_leverage(),
                self.risk_params.max_leverage
            ));
        }

        violations
    }

    /// Check the limits and, if anything is breached, halve every
    /// position. Returns the violations that triggered the reduction.
    pub fn enforce_risk_limits(&self, calculator: &RiskCalculator) -> Vec<String> {
        let violations = self.risk_violations(calculator);
        if !violations.is_empty() {
            self.emergency_risk_reduction();
        }
        violations
    }

    /// Emergency response to any breached limit: every position is halved.
    pub fn emergency_risk_reduction(&self) {
        let mut positions = self.positions.lock().unwrap();
        warn!(
            open_positions = positions.len(),
            "emergency risk reduction: halving all positions"
        );
        for position in positions.iter_mut() {
            position.size /= 2.0;
            position.exposure_amount = position.size * position.current_price;
            position.last_update = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArbitrageLeg, ArbitrageType, Quote};
    use chrono::Duration;

    fn opportunity_with_legs() -> ArbitrageOpportunity {
        let mut opp = ArbitrageOpportunity::new(
            "ARB_TEST".to_string(),
            ArbitrageType::SpotFundingSyntheticPerpetual,
            Utc::now() + Duration::minutes(30),
        );
        opp.legs.push(ArbitrageLeg::new("BTC-PERP", Side::Bid, 1.0, 30_200.0, 1.0));
        opp.legs.push(ArbitrageLeg::new("BTC-USD", Side::Ask, 1.0, 30_000.0, -1.0));
        opp.compute_cost_and_exposure();
        opp
    }

    fn snapshot_at(spot_mid: f64, perp_mid: f64) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::empty();
        snapshot.quotes.insert(
            "BTC-USD".to_string(),
            Quote::new("BTC-USD", spot_mid - 5.0, spot_mid + 5.0, 10.0, 10.0),
        );
        snapshot.quotes.insert(
            "BTC-PERP".to_string(),
            Quote::new("BTC-PERP", perp_mid - 5.0, perp_mid + 5.0, 10.0, 10.0),
        );
        snapshot
    }

    #[test]
    fn execute_opens_one_position_per_leg() {
        let manager = PortfolioManager::new(RiskParameters::default(), 1_000_000.0);
        let ids = manager.execute_opportunity(&opportunity_with_legs());
        assert_eq!(ids.len(), 2);
        let positions = manager.positions();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].side, PositionSide::Long);
        assert_eq!(positions[1].side, PositionSide::Short);
    }

    #[test]
    fn marking_updates_pnl_both_ways() {
        let manager = PortfolioManager::new(RiskParameters::default(), 1_000_000.0);
        manager.execute_opportunity(&opportunity_with_legs());
        // Perp converges down to fair, spot unchanged: the short perp from
        // 30200 to 30100 gains, wait - the long perp entered at 30200 loses.
        manager.update_market_data(&snapshot_at(30_000.0, 30_100.0));
        let total = manager.total_pnl();
        // Long perp: (30100 - 30200) = -100; short spot: (30000 - 30000) = 0.
        assert!((total + 100.0).abs() < 1e-9);
    }

    #[test]
    fn close_realizes_pnl_and_removes_the_position() {
        let manager = PortfolioManager::new(RiskParameters::default(), 1_000_000.0);
        let ids = manager.execute_opportunity(&opportunity_with_legs());
        manager.update_market_data(&snapshot_at(30_000.0, 30_100.0));
        let closed = manager.close_position(&ids[0]).unwrap();
        assert!((closed.realized_pnl + 100.0).abs() < 1e-9);
        assert_eq!(manager.positions().len(), 1);
        assert!(manager.close_position(&ids[0]).is_none());
    }

    #[test]
    fn gross_and_net_exposure() {
        let manager = PortfolioManager::new(RiskParameters::default(), 1_000_000.0);
        manager.execute_opportunity(&opportunity_with_legs());
        manager.update_market_data(&snapshot_at(30_000.0, 30_200.0));
        assert!((manager.gross_exposure() - 60_200.0).abs() < 1e-9);
        assert!((manager.net_exposure() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_position_is_flagged() {
        let manager = PortfolioManager::new(RiskParameters::default(), 100_000.0);
        // 5% of 100k = 5k; a 30k position breaches it.
        manager.execute_opportunity(&opportunity_with_legs());
        let calculator = RiskCalculator::new();
        let violations = manager.risk_violations(&calculator);
        assert!(violations.iter().any(|v| v.contains("size limit")));
    }

    #[test]
    fn breached_limits_trigger_the_emergency_reduction() {
        let manager = PortfolioManager::new(RiskParameters::default(), 100_000.0);
        manager.execute_opportunity(&opportunity_with_legs());
        let calculator = RiskCalculator::new();
        let before = manager.gross_exposure();
        let violations = manager.enforce_risk_limits(&calculator);
        assert!(!violations.is_empty());
        assert!((manager.gross_exposure() - before / 2.0).abs() < 1e-6);

        // A healthy portfolio is left alone.
        let healthy = PortfolioManager::new(RiskParameters::default(), 100_000_000.0);
        assert!(healthy.enforce_risk_limits(&calculator).is_empty());
    }

    #[test]
    fn emergency_reduction_halves_sizes() {
        let manager = PortfolioManager::new(RiskParameters::default(), 1_000_000.0);
        manager.execute_opportunity(&opportunity_with_legs());
        let before = manager.gross_exposure();
        manager.emergency_risk_reduction();
        let after = manager.gross_exposure();
        assert!((after - before / 2.0).abs() < 1e-6);
    }

    #[test]
    fn sharpe_needs_history() {
        let manager = PortfolioManager::new(RiskParameters::default(), 1_000_000.0);
        assert_eq!(manager.sharpe_ratio(), 0.0);
        manager.execute_opportunity(&opportunity_with_legs());
        for i in 0..10 {
            let drift = (i * i) as f64;
            manager.update_market_data(&snapshot_at(30_000.0, 30_200.0 + drift));
        }
        // Steadily rising P&L: positive Sharpe.
        assert!(manager.sharpe_ratio() > 0.0);
    }
}
