//! Engine configuration settings and environment variable handling

use std::env;

use crate::types::{ArbitrageParameters, DetectionParameters, RiskParameters};

// Feed constants
pub const DEFAULT_STALENESS_BUDGET_MS: i64 = 500;
pub const MIN_STALENESS_BUDGET_MS: i64 = 50;
pub const MAX_STALENESS_BUDGET_MS: i64 = 10_000;
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 100;
pub const RECENT_TRADES_CAP: usize = 100;

// Pricing constants
pub const DEFAULT_FUNDING_RATE: f64 = 0.0001;
pub const TRANSACTION_COST_RATE: f64 = 0.0001;
pub const DEFAULT_VOLATILITY: f64 = 0.2;
pub const DEFAULT_TIME_TO_MATURITY_YEARS: f64 = 0.25;

// Risk constants
pub const DEFAULT_PAIRWISE_CORRELATION: f64 = 0.6;
pub const DEFAULT_PORTFOLIO_SIGMA: f64 = 0.05;
pub const VAR_CONFIDENCE_MULTIPLIER: f64 = 1.65;
pub const ES_TO_VAR_RATIO: f64 = 1.3;

// Sizing constants
pub const DEFAULT_PORTFOLIO_VALUE: f64 = 1_000_000.0;
pub const TARGET_VOLATILITY: f64 = 0.10;
pub const KELLY_FRACTION_CAP: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct Config {
    pub staleness_budget_ms: i64,
    pub snapshot_interval_ms: u64,
    pub portfolio_value: f64,
    pub detection: DetectionParameters,
    pub arbitrage: ArbitrageParameters,
    pub risk: RiskParameters,
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    pub fn load() -> Self {
        let mut detection = DetectionParameters::default();
        if let Some(v) = env_f64("MIN_DEVIATION_THRESHOLD") {
            detection.min_deviation_threshold = v.max(0.0);
        }
        if let Some(v) = env_f64("MIN_Z_SCORE") {
            detection.min_z_score = v.max(0.0);
        }
        if let Some(v) = env_f64("MIN_CONFIDENCE_LEVEL") {
            detection.min_confidence_level = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_f64("LIQUIDITY_THRESHOLD") {
            detection.liquidity_threshold = v.max(0.0);
        }

        let mut arbitrage = ArbitrageParameters::default();
        if let Some(v) = env_f64("MIN_PROFIT_THRESHOLD") {
            arbitrage.min_profit_threshold = v.max(0.0);
        }
        if let Some(v) = env_f64("MAX_RISK_PER_TRADE") {
            arbitrage.max_risk_per_trade = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_f64("MAX_POSITION_SIZE") {
            arbitrage.max_position_size = v.max(0.0);
        }

        Self {
            staleness_budget_ms: env::var("STALENESS_BUDGET_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_STALENESS_BUDGET_MS)
                .clamp(MIN_STALENESS_BUDGET_MS, MAX_STALENESS_BUDGET_MS),
            snapshot_interval_ms: env::var("SNAPSHOT_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL_MS)
                .max(10),
            portfolio_value: env_f64("PORTFOLIO_VALUE")
                .unwrap_or(DEFAULT_PORTFOLIO_VALUE)
                .max(0.0),
            detection,
            arbitrage,
            risk: RiskParameters::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = Config::load();
        assert!((config.detection.min_deviation_threshold - 0.005).abs() < 1e-12
            || config.detection.min_deviation_threshold >= 0.0);
        assert!(config.staleness_budget_ms >= MIN_STALENESS_BUDGET_MS);
        assert!(config.snapshot_interval_ms >= 10);
    }

    #[test]
    fn detection_defaults() {
        let d = DetectionParameters::default();
        assert_eq!(d.min_observation_window, 50);
        assert!((d.min_z_score - 2.0).abs() < 1e-12);
        assert!((d.min_confidence_level - 0.8).abs() < 1e-12);
        assert!((d.max_spread_ratio - 0.02).abs() < 1e-12);
    }
}
