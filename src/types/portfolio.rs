//! Positions, portfolios, and risk limits

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::market::{InstrumentId, Price, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionSide {
    Long,
    Short,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub position_id: String,
    pub instrument_id: InstrumentId,
    pub side: PositionSide,
    pub size: Volume,
    pub entry_price: Price,
    pub current_price: Price,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,

    pub value_at_risk: f64,
    pub expected_shortfall: f64,
    pub maximum_drawdown: f64,
    pub exposure_amount: f64,
    pub margin_requirement: f64,

    pub entry_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Position {
    pub fn new(
        position_id: String,
        instrument_id: impl Into<InstrumentId>,
        side: PositionSide,
        size: Volume,
        entry_price: Price,
    ) -> Self {
        let now = Utc::now();
        Self {
            position_id,
            instrument_id: instrument_id.into(),
            side,
            size,
            entry_price,
            current_price: entry_price,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            value_at_risk: 0.0,
            expected_shortfall: 0.0,
            maximum_drawdown: 0.0,
            exposure_amount: size * entry_price,
            margin_requirement: 0.0,
            entry_time: now,
            last_update: now,
        }
    }

    /// Signed exposure: long positive, short negative.
    pub fn signed_exposure(&self) -> f64 {
        match self.side {
            PositionSide::Long => self.size * self.current_price,
            PositionSide::Short => -self.size * self.current_price,
            PositionSide::Neutral => 0.0,
        }
    }

    pub fn mark(&mut self, price: Price, now: DateTime<Utc>) {
        self.current_price = price;
        self.unrealized_pnl = match self.side {
            PositionSide::Long => (price - self.entry_price) * self.size,
            PositionSide::Short => (self.entry_price - price) * self.size,
            PositionSide::Neutral => 0.0,
        };
        self.exposure_amount = self.size * price;
        self.last_update = now;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub portfolio_id: String,
    pub positions: Vec<Position>,

    pub total_exposure: f64,
    pub net_exposure: f64,
    pub gross_exposure: f64,
    pub total_pnl: f64,
    pub total_var: f64,
    pub sharpe_ratio: f64,
    pub correlation_risk: f64,

    pub max_position_size: f64,
    pub max_portfolio_var: f64,
    pub max_correlation_exposure: f64,
    pub max_leverage: f64,
}

impl Portfolio {
    pub fn new(portfolio_id: impl Into<String>) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            positions: Vec::new(),
            total_exposure: 0.0,
            net_exposure: 0.0,
            gross_exposure: 0.0,
            total_pnl: 0.0,
            total_var: 0.0,
            sharpe_ratio: 0.0,
            correlation_risk: 0.0,
            max_position_size: 1_000_000.0,
            max_portfolio_var: 100_000.0,
            max_correlation_exposure: 0.3,
            max_leverage: 3.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskParameters {
    pub max_position_size_percentage: f64,
    pub max_portfolio_var: f64,
    pub max_individual_var: f64,
    pub max_correlation_risk: f64,
    pub max_leverage: f64,
    pub margin_requirement_multiplier: f64,
    pub stop_loss_percentage: f64,
    pub take_profit_percentage: f64,
    pub max_drawdown_threshold: f64,
    pub liquidity_requirement: f64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_size_percentage: 0.05,
            max_portfolio_var: 0.02,
            max_individual_var: 0.01,
            max_correlation_risk: 0.3,
            max_leverage: 3.0,
            margin_requirement_multiplier: 1.2,
            stop_loss_percentage: 0.05,
            take_profit_percentage: 0.15,
            max_drawdown_threshold: 0.1,
            liquidity_requirement: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_position_marks_pnl_upward() {
        let mut pos = Position::new(
            "POS_1".to_string(),
            "BTC-USD",
            PositionSide::Long,
            2.0,
            30000.0,
        );
        pos.mark(30100.0, Utc::now());
        assert!((pos.unrealized_pnl - 200.0).abs() < 1e-9);
        assert!((pos.signed_exposure() - 60200.0).abs() < 1e-9);
    }

    #[test]
    fn short_position_profits_on_decline() {
        let mut pos = Position::new(
            "POS_2".to_string(),
            "BTC-PERP",
            PositionSide::Short,
            1.0,
            30000.0,
        );
        pos.mark(29800.0, Utc::now());
        assert!((pos.unrealized_pnl - 200.0).abs() < 1e-9);
        assert!(pos.signed_exposure() < 0.0);
    }
}
