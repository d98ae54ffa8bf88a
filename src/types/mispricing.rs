//! Mispricing events and detection parameters

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::market::{ExchangeId, InstrumentId, Price, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MispricingType {
    StatisticalArbitrage,
    CrossCurrencyTriangular,
    MeanReversion,
    VolatilityArbitrage,
    SpreadAnomaly,
    SpotVsSyntheticDerivative,
    CrossExchangeArbitrage,
    RealTimePriceDiscrepancy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum MispricingSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MispricingSeverity {
    /// Severity is monotonic in the absolute deviation.
    pub fn from_deviation(deviation: f64) -> Self {
        let d = deviation.abs();
        if d > 0.05 {
            Self::Critical
        } else if d > 0.02 {
            Self::High
        } else if d > 0.01 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MispricingOpportunity {
    pub target_instrument: InstrumentId,
    pub component_instruments: Vec<InstrumentId>,
    pub mispricing_type: MispricingType,
    pub severity: MispricingSeverity,

    pub market_price: Price,
    pub theoretical_price: Price,
    pub deviation_percentage: f64,
    pub z_score: f64,
    pub confidence_level: f64,
    pub expected_profit: f64,
    pub max_loss: f64,

    pub weights: Vec<f64>,
    pub detection_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,

    pub value_at_risk: f64,
    pub expected_shortfall: f64,
    pub sharpe_ratio: f64,
}

impl MispricingOpportunity {
    pub fn new(
        target_instrument: impl Into<InstrumentId>,
        mispricing_type: MispricingType,
        market_price: Price,
        theoretical_price: Price,
        max_duration: Duration,
    ) -> Self {
        let deviation_percentage = if theoretical_price != 0.0 {
            (market_price - theoretical_price) / theoretical_price
        } else {
            0.0
        };
        let detection_time = Utc::now();
        Self {
            target_instrument: target_instrument.into(),
            component_instruments: Vec::new(),
            mispricing_type,
            severity: MispricingSeverity::from_deviation(deviation_percentage),
            market_price,
            theoretical_price,
            deviation_percentage,
            z_score: 0.0,
            confidence_level: 0.0,
            expected_profit: 0.0,
            max_loss: 0.0,
            weights: Vec::new(),
            detection_time,
            expiry_time: detection_time + max_duration,
            value_at_risk: 0.0,
            expected_shortfall: 0.0,
            sharpe_ratio: 0.0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_time
    }

    /// Dedup key used by the composite detector.
    pub fn dedup_key(&self) -> (MispricingType, InstrumentId) {
        (self.mispricing_type, self.target_instrument.clone())
    }
}

#[derive(Debug, Clone)]
pub struct DetectionParameters {
    pub min_deviation_threshold: f64,
    pub min_z_score: f64,
    pub min_confidence_level: f64,
    pub max_spread_ratio: f64,
    pub min_observation_window: usize,
    pub volatility_threshold: f64,
    pub liquidity_threshold: Volume,
    pub max_opportunity_duration: Duration,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            min_deviation_threshold: 0.005,
            min_z_score: 2.0,
            min_confidence_level: 0.8,
            max_spread_ratio: 0.02,
            min_observation_window: 50,
            volatility_threshold: 0.15,
            liquidity_threshold: 1000.0,
            max_opportunity_duration: Duration::minutes(30),
        }
    }
}

impl DetectionParameters {
    /// The shared significance gate: every emitted opportunity must clear
    /// all three thresholds.
    pub fn is_significant(&self, deviation: f64, z_score: f64, confidence: f64) -> bool {
        deviation.abs() > self.min_deviation_threshold
            && z_score.abs() > self.min_z_score
            && confidence > self.min_confidence_level
    }
}

/// Cross-exchange spread record with capital-efficiency annotations.
#[derive(Debug, Clone, Serialize)]
pub struct CrossExchangeOpportunity {
    pub instrument_id: InstrumentId,
    pub buy_exchange: ExchangeId,
    pub sell_exchange: ExchangeId,
    pub buy_price: Price,
    pub sell_price: Price,
    pub price_spread: Price,
    pub percentage_spread: f64,
    pub expected_profit: f64,
    pub net_profit_after_costs: f64,
    pub required_capital: f64,
    pub capital_efficiency_ratio: f64,
    pub available_volume: Volume,
    pub execution_probability: f64,
    pub detection_time: DateTime<Utc>,
}

/// One basis observation for a registered (spot, derivative) pair.
#[derive(Debug, Clone, Serialize)]
pub struct BasisCalculation {
    pub spot_instrument: InstrumentId,
    pub derivative_instrument: InstrumentId,
    pub spot_price: Price,
    pub derivative_price: Price,
    pub basis_value: f64,
    pub theoretical_basis: f64,
    pub basis_deviation: f64,
    pub z_score: f64,
    pub calculation_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_mapping_matches_thresholds() {
        assert_eq!(MispricingSeverity::from_deviation(0.051), MispricingSeverity::Critical);
        assert_eq!(MispricingSeverity::from_deviation(0.021), MispricingSeverity::High);
        assert_eq!(MispricingSeverity::from_deviation(0.011), MispricingSeverity::Medium);
        assert_eq!(MispricingSeverity::from_deviation(0.009), MispricingSeverity::Low);
        assert_eq!(MispricingSeverity::from_deviation(-0.06), MispricingSeverity::Critical);
    }

    #[test]
    fn severity_is_monotonic_in_deviation() {
        let devs = [0.001, 0.005, 0.011, 0.015, 0.021, 0.04, 0.051, 0.2];
        let severities: Vec<_> = devs
            .iter()
            .map(|d| MispricingSeverity::from_deviation(*d))
            .collect();
        for pair in severities.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn significance_gate_requires_all_three() {
        let params = DetectionParameters::default();
        assert!(params.is_significant(0.01, 2.5, 0.9));
        assert!(!params.is_significant(0.004, 2.5, 0.9));
        assert!(!params.is_significant(0.01, 1.9, 0.9));
        assert!(!params.is_significant(0.01, 2.5, 0.7));
    }

    #[test]
    fn expiry_follows_detection_time() {
        let opp = MispricingOpportunity::new(
            "BTC-PERP",
            MispricingType::StatisticalArbitrage,
            30200.0,
            30000.0,
            Duration::minutes(30),
        );
        assert!(opp.expiry_time > opp.detection_time);
        assert_eq!(opp.expiry_time - opp.detection_time, Duration::minutes(30));
    }
}
