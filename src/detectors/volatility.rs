//! Realized-vs-implied volatility gap detection

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;

use crate::detectors::detector::{
    ActiveOpportunities, DetectionCallback, ExpiryCallback, MispricingDetector,
};
use crate::types::{
    DetectionParameters, InstrumentId, MarketSnapshot, MispricingOpportunity, MispricingSeverity,
    MispricingType, Quote,
};
use crate::utils::annualized_volatility;

pub const VOLATILITY_HISTORY_CAP: usize = 100;
pub const MIN_VOLATILITY_SAMPLES: usize = 20;

/// Tracks a bounded mid-price history per instrument and compares the
/// annualized realized volatility against a spread-implied proxy.
pub struct VolatilityDetector {
    params: DetectionParameters,
    mid_history: HashMap<InstrumentId, VecDeque<f64>>,
    active: ActiveOpportunities,
    latest_snapshot: Option<Arc<MarketSnapshot>>,
    detection_callback: Option<DetectionCallback>,
    expiry_callback: Option<ExpiryCallback>,
}

/// Spread-implied volatility proxy: relative spread of the quote.
pub fn implied_volatility_proxy(quote: &Quote) -> f64 {
    quote.spread_ratio()
}

impl VolatilityDetector {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            params,
            mid_history: HashMap::new(),
            active: ActiveOpportunities::new(),
            latest_snapshot: None,
            detection_callback: None,
            expiry_callback: None,
        }
    }

    pub fn realized_volatility(&self, instrument: &str) -> Option<f64> {
        let history = self.mid_history.get(instrument)?;
        if history.len() < MIN_VOLATILITY_SAMPLES {
            return None;
        }
        let prices: Vec<f64> = history.iter().copied().collect();
        Some(annualized_volatility(&prices))
    }

    pub fn get_active_opportunities(&self) -> Vec<MispricingOpportunity> {
        self.active.snapshot()
    }
}

impl MispricingDetector for VolatilityDetector {
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        for (instrument, quote) in &snapshot.quotes {
            let history = self.mid_history.entry(instrument.clone()).or_default();
            history.push_back(quote.mid());
            while history.len() > VOLATILITY_HISTORY_CAP {
                history.pop_front();
            }
        }
        self.latest_snapshot = Some(Arc::clone(snapshot));
        self.active.sweep_expired(Utc::now(), self.expiry_callback.as_ref());
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let Some(snapshot) = &self.latest_snapshot else {
            return Vec::new();
        };

        let mut opportunities = Vec::new();
        for (instrument, history) in &self.mid_history {
            if history.len() < MIN_VOLATILITY_SAMPLES {
                continue;
            }
            let Some(quote) = snapshot.quote(instrument) else {
                continue;
            };

            let prices: Vec<f64> = history.iter().copied().collect();
            let realized = annualized_volatility(&prices);
            let implied = implied_volatility_proxy(quote);
            let gap = implied - realized;

            if gap.abs() <= self.params.volatility_threshold {
                continue;
            }
            // The gap must also clear the shared significance gate:
            // confidence is the history fill ratio, and the reported z is
            // the gap's multiple of the volatility threshold on the z
            // scale.
            let z_score = if self.params.volatility_threshold > 0.0 {
                (gap / self.params.volatility_threshold) * self.params.min_z_score
            } else {
                self.params.min_z_score
            };
            let confidence =
                (history.len() as f64 / VOLATILITY_HISTORY_CAP as f64).clamp(0.0, 1.0);
            if !self.params.is_significant(gap, z_score, confidence) {
                continue;
            }

            let mut opportunity = MispricingOpportunity::new(
                instrument.clone(),
                MispricingType::VolatilityArbitrage,
                implied,
                realized,
                self.params.max_opportunity_duration,
            );
            opportunity.component_instruments = vec![instrument.clone()];
            opportunity.weights = vec![1.0];
            opportunity.deviation_percentage = gap;
            opportunity.severity = MispricingSeverity::from_deviation(gap);
            opportunity.z_score = z_score;
            opportunity.confidence_level = confidence;
            let size = quote.bid_size.min(quote.ask_size);
            opportunity.expected_profit = gap.abs() * quote.mid() * size;
            opportunity.max_loss = quote.spread() * size;

            if let Some(callback) = &self.detection_callback {
                callback(&opportunity);
            }
            self.active.push(opportunity.clone());
            opportunities.push(opportunity);
        }
        opportunities
    }

    fn update_parameters(&mut self, params: DetectionParameters) {
        self.params = params;
    }

    fn set_detection_callback(&mut self, callback: DetectionCallback) {
        self.detection_callback = Some(callback);
    }

    fn set_expiry_callback(&mut self, callback: ExpiryCallback) {
        self.expiry_callback = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(instrument: &str, bid: f64, ask: f64) -> Arc<MarketSnapshot> {
        let mut snapshot = MarketSnapshot::empty();
        let quote = Quote::new(instrument, bid, ask, 10.0, 10.0);
        snapshot.snapshot_time = quote.timestamp;
        snapshot.quotes.insert(instrument.to_string(), quote);
        Arc::new(snapshot)
    }

    #[test]
    fn needs_twenty_samples() {
        let mut detector = VolatilityDetector::new(DetectionParameters::default());
        for _ in 0..(MIN_VOLATILITY_SAMPLES - 1) {
            detector.update_market_data(&snapshot_with("BTC-USD", 29_995.0, 30_005.0));
        }
        assert!(detector.realized_volatility("BTC-USD").is_none());
        assert!(detector.detect_opportunities().is_empty());
    }

    #[test]
    fn flat_history_means_zero_realized_vol() {
        let mut detector = VolatilityDetector::new(DetectionParameters::default());
        for _ in 0..30 {
            detector.update_market_data(&snapshot_with("BTC-USD", 29_995.0, 30_005.0));
        }
        assert!(detector.realized_volatility("BTC-USD").unwrap().abs() < 1e-12);
    }

    #[test]
    fn wide_spread_against_quiet_history_emits() {
        // Realized vol ~0; implied proxy = spread/mid = 20% > 15%
        // threshold, with a full history so confidence clears the gate.
        let mut detector = VolatilityDetector::new(DetectionParameters::default());
        for _ in 0..VOLATILITY_HISTORY_CAP {
            detector.update_market_data(&snapshot_with("BTC-USD", 29_995.0, 30_005.0));
        }
        detector.update_market_data(&snapshot_with("BTC-USD", 27_000.0, 33_000.0));
        let opportunities = detector.detect_opportunities();
        assert_eq!(opportunities.len(), 1);
        let opp = &opportunities[0];
        assert_eq!(opp.mispricing_type, MispricingType::VolatilityArbitrage);
        assert!(opp.deviation_percentage > 0.15);
        assert!(opp.z_score.abs() > 2.0);
        assert!((opp.confidence_level - 1.0).abs() < 1e-9);
    }

    #[test]
    fn short_history_fails_the_confidence_gate() {
        // The same 20% gap over only 30 samples: confidence is 0.3 and
        // the significance gate suppresses the emission.
        let mut detector = VolatilityDetector::new(DetectionParameters::default());
        for _ in 0..29 {
            detector.update_market_data(&snapshot_with("BTC-USD", 29_995.0, 30_005.0));
        }
        detector.update_market_data(&snapshot_with("BTC-USD", 27_000.0, 33_000.0));
        assert!(detector.detect_opportunities().is_empty());
    }

    #[test]
    fn tight_spread_with_quiet_history_is_silent() {
        let mut detector = VolatilityDetector::new(DetectionParameters::default());
        for _ in 0..30 {
            detector.update_market_data(&snapshot_with("BTC-USD", 29_995.0, 30_005.0));
        }
        assert!(detector.detect_opportunities().is_empty());
    }

    #[test]
    fn history_is_bounded() {
        let mut detector = VolatilityDetector::new(DetectionParameters::default());
        for i in 0..200 {
            let mid = 30_000.0 + (i % 7) as f64;
            detector.update_market_data(&snapshot_with("BTC-USD", mid - 5.0, mid + 5.0));
        }
        assert_eq!(
            detector.mid_history.get("BTC-USD").unwrap().len(),
            VOLATILITY_HISTORY_CAP
        );
    }
}
