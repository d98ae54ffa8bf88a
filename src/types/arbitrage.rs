//! Arbitrage opportunity records and engine parameters

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::market::{InstrumentId, Price, Side, Volume};
use super::mispricing::MispricingOpportunity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArbitrageType {
    PureArbitrage,
    StatisticalArbitrage,
    TriangularArbitrage,
    CalendarSpread,
    InterMarketSpread,
    SpotFundingSyntheticPerpetual,
    CrossExchangeSyntheticReplication,
    MultiInstrumentSyntheticCombination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArbitrageStatus {
    Identified,
    Validated,
    Executing,
    Completed,
    Failed,
    Expired,
}

impl ArbitrageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// Transitions are monotonic: Identified -> Validated -> Executing ->
    /// Completed, with Failed reachable from Identified and Expired from
    /// any non-terminal state.
    pub fn can_transition_to(&self, next: ArbitrageStatus) -> bool {
        use ArbitrageStatus::*;
        match (*self, next) {
            (Identified, Validated) => true,
            (Identified, Failed) => true,
            (Validated, Executing) => true,
            (Executing, Completed) => true,
            (Identified | Validated | Executing, Expired) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageLeg {
    pub instrument_id: InstrumentId,
    /// Bid means this leg buys (consumes ask liquidity), Ask means it sells.
    pub side: Side,
    pub size: Volume,
    pub entry_price: Price,
    pub exit_price: Option<Price>,
    pub weight: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl ArbitrageLeg {
    pub fn new(
        instrument_id: impl Into<InstrumentId>,
        side: Side,
        size: Volume,
        entry_price: Price,
        weight: f64,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            side,
            size,
            entry_price,
            exit_price: None,
            weight,
            entry_time: Utc::now(),
            exit_time: None,
        }
    }

    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageOpportunity {
    pub opportunity_id: String,
    pub arbitrage_type: ArbitrageType,
    pub status: ArbitrageStatus,

    pub legs: Vec<ArbitrageLeg>,
    pub mispricing_source: Option<MispricingOpportunity>,

    // Financial metrics
    pub expected_profit: f64,
    pub max_loss: f64,
    pub profit_probability: f64,
    pub break_even_price: Price,
    pub total_cost: f64,
    pub net_exposure: f64,

    // Risk metrics
    pub value_at_risk: f64,
    pub expected_shortfall: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub correlation_risk: f64,

    // Timing
    pub identification_time: DateTime<Utc>,
    pub validation_time: Option<DateTime<Utc>>,
    pub expiry_time: DateTime<Utc>,
    pub estimated_duration_ms: i64,

    // Execution estimates
    pub slippage_estimate: f64,
    pub transaction_costs: f64,
    pub total_volume: Volume,
    pub market_impact: f64,
}

impl ArbitrageOpportunity {
    pub fn new(
        opportunity_id: String,
        arbitrage_type: ArbitrageType,
        expiry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            opportunity_id,
            arbitrage_type,
            status: ArbitrageStatus::Identified,
            legs: Vec::new(),
            mispricing_source: None,
            expected_profit: 0.0,
            max_loss: 0.0,
            profit_probability: 0.0,
            break_even_price: 0.0,
            total_cost: 0.0,
            net_exposure: 0.0,
            value_at_risk: 0.0,
            expected_shortfall: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            correlation_risk: 0.0,
            identification_time: Utc::now(),
            validation_time: None,
            expiry_time,
            estimated_duration_ms: 0,
            slippage_estimate: 0.0,
            transaction_costs: 0.0,
            total_volume: 0.0,
            market_impact: 0.0,
        }
    }

    /// Attempt a status transition; returns false and leaves the status
    /// untouched when the transition would violate the state machine.
    pub fn transition_to(&mut self, next: ArbitrageStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            if next == ArbitrageStatus::Validated {
                self.validation_time = Some(Utc::now());
            }
            true
        } else {
            false
        }
    }

    /// Sum of size * entry_price across legs; validation reads this, so it
    /// is recomputed whenever legs change. A leg's size already carries the
    /// weight magnitude, so net exposure only takes the weight's sign.
    pub fn compute_cost_and_exposure(&mut self) {
        self.total_cost = self.legs.iter().map(ArbitrageLeg::notional).sum();
        self.net_exposure = self
            .legs
            .iter()
            .map(|l| l.weight.signum() * l.entry_price * l.size)
            .sum();
        self.total_volume = self.legs.iter().map(|l| l.size).sum();
    }

    pub fn gross_exposure(&self) -> f64 {
        self.legs.iter().map(|l| (l.entry_price * l.size).abs()).sum()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_time
    }
}

#[derive(Debug, Clone)]
pub struct ArbitrageParameters {
    pub min_profit_threshold: f64,
    pub max_risk_per_trade: f64,
    pub max_correlation_risk: f64,
    pub max_market_impact: f64,
    pub max_slippage: f64,
    pub max_position_size: f64,
    pub max_holding_period: Duration,
    pub min_liquidity_requirement: f64,
    pub confidence_threshold: f64,
    /// Minimum execution headroom before expiry.
    pub min_execution_window: Duration,
}

impl Default for ArbitrageParameters {
    fn default() -> Self {
        Self {
            min_profit_threshold: 0.001,
            max_risk_per_trade: 0.02,
            max_correlation_risk: 0.3,
            max_market_impact: 0.005,
            max_slippage: 0.001,
            max_position_size: 1_000_000.0,
            max_holding_period: Duration::minutes(60),
            min_liquidity_requirement: 100_000.0,
            confidence_threshold: 0.8,
            min_execution_window: Duration::minutes(5),
        }
    }
}
