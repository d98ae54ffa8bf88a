//! Triangular arbitrage detection over registered currency triangles

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::detectors::detector::{
    ActiveOpportunities, DetectionCallback, ExpiryCallback, MispricingDetector,
};
use crate::types::{
    DetectionParameters, InstrumentId, MarketSnapshot, MispricingOpportunity, MispricingSeverity,
    MispricingType, Quote,
};

/// A triangle is registered as [A/B, B/C, A/C]. The forward cycle sells A
/// for B, sells B for C, and buys A back with C; the reverse cycle runs
/// the other way around. Profit is per unit of A round-tripped.
pub struct TriangularDetector {
    params: DetectionParameters,
    currency_triangles: HashMap<String, [InstrumentId; 3]>,
    active: ActiveOpportunities,
    latest_snapshot: Option<Arc<MarketSnapshot>>,
    detection_callback: Option<DetectionCallback>,
    expiry_callback: Option<ExpiryCallback>,
}

/// Forward cycle profit: bid(A/B) * bid(B/C) / ask(A/C) - 1.
pub fn triangular_profit(leg_ab: &Quote, leg_bc: &Quote, leg_ac: &Quote) -> f64 {
    if leg_ac.ask_price <= 0.0 {
        return 0.0;
    }
    leg_ab.bid_price * leg_bc.bid_price / leg_ac.ask_price - 1.0
}

/// Reverse cycle profit: bid(A/C) / (ask(A/B) * ask(B/C)) - 1.
pub fn reverse_triangular_profit(leg_ab: &Quote, leg_bc: &Quote, leg_ac: &Quote) -> f64 {
    let cost = leg_ab.ask_price * leg_bc.ask_price;
    if cost <= 0.0 {
        return 0.0;
    }
    leg_ac.bid_price / cost - 1.0
}

impl TriangularDetector {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            params,
            currency_triangles: HashMap::new(),
            active: ActiveOpportunities::new(),
            latest_snapshot: None,
            detection_callback: None,
            expiry_callback: None,
        }
    }

    pub fn add_currency_triangle(
        &mut self,
        name: impl Into<String>,
        instruments: [InstrumentId; 3],
    ) {
        self.currency_triangles.insert(name.into(), instruments);
    }

    pub fn remove_currency_triangle(&mut self, name: &str) {
        self.currency_triangles.remove(name);
    }

    pub fn get_active_opportunities(&self) -> Vec<MispricingOpportunity> {
        self.active.snapshot()
    }

    fn is_profitable(&self, profit: f64) -> bool {
        profit > self.params.min_deviation_threshold
    }
}

impl MispricingDetector for TriangularDetector {
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.latest_snapshot = Some(Arc::clone(snapshot));
        self.active.sweep_expired(Utc::now(), self.expiry_callback.as_ref());
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let Some(snapshot) = &self.latest_snapshot else {
            return Vec::new();
        };

        let mut opportunities = Vec::new();
        for triangle in self.currency_triangles.values() {
            let [ab_id, bc_id, ac_id] = triangle;
            let (Some(ab), Some(bc), Some(ac)) = (
                snapshot.quote(ab_id),
                snapshot.quote(bc_id),
                snapshot.quote(ac_id),
            ) else {
                continue;
            };

            let forward = triangular_profit(ab, bc, ac);
            let reverse = reverse_triangular_profit(ab, bc, ac);
            let profit = forward.max(reverse);
            if !self.is_profitable(profit) {
                continue;
            }

            // The third leg carries the mispricing relative to the cross
            // implied by the first two.
            let implied_cross = if forward >= reverse {
                ab.bid_price * bc.bid_price
            } else {
                ab.ask_price * bc.ask_price
            };

            let mut opportunity = MispricingOpportunity::new(
                ac_id.clone(),
                MispricingType::CrossCurrencyTriangular,
                ac.mid(),
                implied_cross,
                self.params.max_opportunity_duration,
            );
            opportunity.component_instruments = triangle.to_vec();
            // One unit of A converts into bid(A/B) units of B mid-cycle,
            // so the second leg carries that notional weight.
            opportunity.weights = vec![1.0, ab.bid_price, -1.0];
            opportunity.deviation_percentage = profit;
            opportunity.severity = MispricingSeverity::from_deviation(profit);
            // Cycle profit is deterministic, not sampled; report its
            // multiple of the emission threshold on the z scale.
            opportunity.z_score = if self.params.min_deviation_threshold > 0.0 {
                (profit / self.params.min_deviation_threshold) * self.params.min_z_score
            } else {
                self.params.min_z_score
            };
            opportunity.confidence_level = 1.0;
            let cycle_size = ab.bid_size.min(bc.bid_size).min(ac.ask_size);
            opportunity.expected_profit = profit * cycle_size * ac.mid();
            opportunity.max_loss = (ab.spread() + bc.spread() + ac.spread()) * cycle_size;

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

    fn snapshot(quotes: &[Quote]) -> Arc<MarketSnapshot> {
        let mut snapshot = MarketSnapshot::empty();
        for quote in quotes {
            snapshot.snapshot_time = quote.timestamp;
            snapshot
                .quotes
                .insert(quote.instrument_id.clone(), quote.clone());
        }
        Arc::new(snapshot)
    }

    fn btc_eth_usd_detector(threshold: f64) -> TriangularDetector {
        let mut detector = TriangularDetector::new(DetectionParameters {
            min_deviation_threshold: threshold,
            ..DetectionParameters::default()
        });
        detector.add_currency_triangle(
            "BTC-ETH-USD",
            [
                "BTC-ETH".to_string(),
                "ETH-USD".to_string(),
                "BTC-USD".to_string(),
            ],
        );
        detector
    }

    #[test]
    fn profitable_triangle_is_detected() {
        // Sell 1 BTC at 15.10 ETH, sell ETH at 2000 USD, buy BTC back at
        // 30010 USD: 15.10 * 2000 / 30010 = 1.00633 BTC.
        let mut detector = btc_eth_usd_detector(0.001);
        let snapshot = snapshot(&[
            Quote::new("BTC-USD", 30_000.0, 30_010.0, 10.0, 10.0),
            Quote::new("ETH-USD", 2_000.0, 2_002.0, 100.0, 100.0),
            Quote::new("BTC-ETH", 15.10, 15.12, 10.0, 10.0),
        ]);
        detector.update_market_data(&snapshot);
        let opportunities = detector.detect_opportunities();

        assert_eq!(opportunities.len(), 1);
        let opp = &opportunities[0];
        let expected = 15.10 * 2_000.0 / 30_010.0 - 1.0;
        assert!((opp.deviation_percentage - expected).abs() < 1e-9);
        assert!((opp.deviation_percentage - 0.0063).abs() < 5e-4);
        assert_eq!(opp.severity, MispricingSeverity::Low);
        assert_eq!(opp.mispricing_type, MispricingType::CrossCurrencyTriangular);
        assert_eq!(opp.component_instruments.len(), 3);
    }

    #[test]
    fn balanced_triangle_emits_nothing() {
        // Cross at exactly bid(A/B)*bid(B/C): no cycle beats the spread.
        let mut detector = btc_eth_usd_detector(0.001);
        let snapshot = snapshot(&[
            Quote::new("BTC-USD", 30_200.0, 30_210.0, 10.0, 10.0),
            Quote::new("ETH-USD", 2_000.0, 2_002.0, 100.0, 100.0),
            Quote::new("BTC-ETH", 15.10, 15.12, 10.0, 10.0),
        ]);
        detector.update_market_data(&snapshot);
        assert!(detector.detect_opportunities().is_empty());
    }

    #[test]
    fn reverse_cycle_is_also_found() {
        // Third leg far above the implied cross: buy A via B, sell at A/C.
        let mut detector = btc_eth_usd_detector(0.001);
        let snapshot = snapshot(&[
            Quote::new("BTC-USD", 30_600.0, 30_610.0, 10.0, 10.0),
            Quote::new("ETH-USD", 2_000.0, 2_002.0, 100.0, 100.0),
            Quote::new("BTC-ETH", 15.10, 15.12, 10.0, 10.0),
        ]);
        detector.update_market_data(&snapshot);
        let opportunities = detector.detect_opportunities();
        assert_eq!(opportunities.len(), 1);
        let expected = 30_600.0 / (15.12 * 2_002.0) - 1.0;
        assert!((opportunities[0].deviation_percentage - expected).abs() < 1e-9);
    }

    #[test]
    fn missing_leg_skips_the_triangle() {
        let mut detector = btc_eth_usd_detector(0.001);
        let snapshot = snapshot(&[
            Quote::new("BTC-USD", 30_000.0, 30_010.0, 10.0, 10.0),
            Quote::new("ETH-USD", 2_000.0, 2_002.0, 100.0, 100.0),
        ]);
        detector.update_market_data(&snapshot);
        assert!(detector.detect_opportunities().is_empty());
    }

    #[test]
    fn removed_triangle_is_no_longer_scanned() {
        let mut detector = btc_eth_usd_detector(0.001);
        detector.remove_currency_triangle("BTC-ETH-USD");
        let snapshot = snapshot(&[
            Quote::new("BTC-USD", 30_000.0, 30_010.0, 10.0, 10.0),
            Quote::new("ETH-USD", 2_000.0, 2_002.0, 100.0, 100.0),
            Quote::new("BTC-ETH", 15.10, 15.12, 10.0, 10.0),
        ]);
        detector.update_market_data(&snapshot);
        assert!(detector.detect_opportunities().is_empty());
    }
}
