//! Fan-out over child detectors with consolidated results

use std::collections::HashMap;
use std::sync::Arc;

use crate::detectors::detector::{DetectionCallback, ExpiryCallback, MispricingDetector};
use crate::types::{DetectionParameters, MarketSnapshot, MispricingOpportunity};

/// Owns a set of child detectors; updates and detection fan out to every
/// child, and the merged result is sorted by expected profit with
/// duplicates collapsed by (type, target instrument), keeping the most
/// profitable entry.
pub struct CompositeDetector {
    params: DetectionParameters,
    detectors: Vec<Box<dyn MispricingDetector>>,
    detection_callback: Option<DetectionCallback>,
    expiry_callback: Option<ExpiryCallback>,
}

impl CompositeDetector {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            params,
            detectors: Vec::new(),
            detection_callback: None,
            expiry_callback: None,
        }
    }

    pub fn add_detector(&mut self, mut detector: Box<dyn MispricingDetector>) {
        if let Some(callback) = &self.detection_callback {
            detector.set_detection_callback(Arc::clone(callback));
        }
        if let Some(callback) = &self.expiry_callback {
            detector.set_expiry_callback(Arc::clone(callback));
        }
        detector.update_parameters(self.params.clone());
        self.detectors.push(detector);
    }

    pub fn remove_detector(&mut self, index: usize) {
        if index < self.detectors.len() {
            self.detectors.remove(index);
        }
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    fn consolidate(opportunities: Vec<MispricingOpportunity>) -> Vec<MispricingOpportunity> {
        let mut best: HashMap<_, MispricingOpportunity> = HashMap::new();
        for opportunity in opportunities {
            let key = opportunity.dedup_key();
            match best.get(&key) {
                Some(existing) if existing.expected_profit >= opportunity.expected_profit => {}
                _ => {
                    best.insert(key, opportunity);
                }
            }
        }
        let mut merged: Vec<_> = best.into_values().collect();
        merged.sort_by(|a, b| {
            b.expected_profit
                .partial_cmp(&a.expected_profit)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged
    }
}

impl MispricingDetector for CompositeDetector {
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        for detector in &mut self.detectors {
            detector.update_market_data(snapshot);
        }
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let mut all = Vec::new();
        for detector in &mut self.detectors {
            all.extend(detector.detect_opportunities());
        }
        Self::consolidate(all)
    }

    fn update_parameters(&mut self, params: DetectionParameters) {
        self.params = params.clone();
        for detector in &mut self.detectors {
            detector.update_parameters(params.clone());
        }
    }

    fn set_detection_callback(&mut self, callback: DetectionCallback) {
        for detector in &mut self.detectors {
            detector.set_detection_callback(Arc::clone(&callback));
        }
        self.detection_callback = Some(callback);
    }

    fn set_expiry_callback(&mut self, callback: ExpiryCallback) {
        for detector in &mut self.detectors {
            detector.set_expiry_callback(Arc::clone(&callback));
        }
        self.expiry_callback = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MispricingSeverity, MispricingType};
    use chrono::Duration;

    /// Child that emits a fixed list on every poll.
    struct FixedDetector {
        emissions: Vec<MispricingOpportunity>,
    }

    impl MispricingDetector for FixedDetector {
        fn update_market_data(&mut self, _snapshot: &Arc<MarketSnapshot>) {}

        fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
            self.emissions.clone()
        }

        fn update_parameters(&mut self, _params: DetectionParameters) {}
        fn set_detection_callback(&mut self, _callback: DetectionCallback) {}
        fn set_expiry_callback(&mut self, _callback: ExpiryCallback) {}
    }

    fn opportunity(
        target: &str,
        mispricing_type: MispricingType,
        profit: f64,
    ) -> MispricingOpportunity {
        let mut opp = MispricingOpportunity::new(
            target,
            mispricing_type,
            30_100.0,
            30_000.0,
            Duration::minutes(30),
        );
        opp.expected_profit = profit;
        opp.severity = MispricingSeverity::Low;
        opp
    }

    #[test]
    fn results_are_sorted_by_expected_profit() {
        let mut composite = CompositeDetector::new(DetectionParameters::default());
        composite.add_detector(Box::new(FixedDetector {
            emissions: vec![
                opportunity("A", MispricingType::StatisticalArbitrage, 10.0),
                opportunity("B", MispricingType::StatisticalArbitrage, 50.0),
            ],
        }));
        composite.add_detector(Box::new(FixedDetector {
            emissions: vec![opportunity("C", MispricingType::VolatilityArbitrage, 30.0)],
        }));

        let merged = composite.detect_opportunities();
        let profits: Vec<f64> = merged.iter().map(|o| o.expected_profit).collect();
        assert_eq!(profits, vec![50.0, 30.0, 10.0]);
    }

    #[test]
    fn duplicates_keep_the_highest_profit() {
        let mut composite = CompositeDetector::new(DetectionParameters::default());
        composite.add_detector(Box::new(FixedDetector {
            emissions: vec![opportunity("A", MispricingType::StatisticalArbitrage, 10.0)],
        }));
        composite.add_detector(Box::new(FixedDetector {
            emissions: vec![opportunity("A", MispricingType::StatisticalArbitrage, 40.0)],
        }));

        let merged = composite.detect_opportunities();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].expected_profit, 40.0);
    }

    #[test]
    fn same_target_different_type_is_not_a_duplicate() {
        let mut composite = CompositeDetector::new(DetectionParameters::default());
        composite.add_detector(Box::new(FixedDetector {
            emissions: vec![
                opportunity("A", MispricingType::StatisticalArbitrage, 10.0),
                opportunity("A", MispricingType::VolatilityArbitrage, 20.0),
            ],
        }));

        assert_eq!(composite.detect_opportunities().len(), 2);
    }

    #[test]
    fn removing_a_detector_stops_its_emissions() {
        let mut composite = CompositeDetector::new(DetectionParameters::default());
        composite.add_detector(Box::new(FixedDetector {
            emissions: vec![opportunity("A", MispricingType::StatisticalArbitrage, 10.0)],
        }));
        composite.remove_detector(0);
        assert!(composite.detect_opportunities().is_empty());
        assert!(composite.is_empty());
    }
}
