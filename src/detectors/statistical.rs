//! Statistical mispricing detection against a pricing model

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::detectors::detector::{
    ActiveOpportunities, DetectionCallback, ExpiryCallback, MispricingDetector,
};
use crate::pricing::PricingModel;
use crate::types::{
    DetectionParameters, InstrumentId, MarketSnapshot, MispricingOpportunity, MispricingSeverity,
    MispricingType, Quote,
};
use crate::utils::z_score;

/// Compares market prices against a pricing model's synthetic price and
/// emits opportunities whose deviation is statistically significant
/// against the per-instrument deviation history.
pub struct StatisticalDetector {
    params: DetectionParameters,
    pricing_model: Box<dyn PricingModel>,
    price_history: HashMap<InstrumentId, VecDeque<Quote>>,
    deviation_history: HashMap<InstrumentId, VecDeque<f64>>,
    active: ActiveOpportunities,
    latest_snapshot: Option<Arc<MarketSnapshot>>,
    detection_callback: Option<DetectionCallback>,
    expiry_callback: Option<ExpiryCallback>,
    insufficient_history_skips: u64,
}

impl StatisticalDetector {
    pub fn new(pricing_model: Box<dyn PricingModel>, params: DetectionParameters) -> Self {
        Self {
            params,
            pricing_model,
            price_history: HashMap::new(),
            deviation_history: HashMap::new(),
            active: ActiveOpportunities::new(),
            latest_snapshot: None,
            detection_callback: None,
            expiry_callback: None,
            insufficient_history_skips: 0,
        }
    }

    pub fn get_active_opportunities(&self) -> Vec<MispricingOpportunity> {
        self.active.snapshot()
    }

    pub fn clear_opportunities(&self) {
        self.active.clear();
    }

    pub fn insufficient_history_skips(&self) -> u64 {
        self.insufficient_history_skips
    }

    fn update_price_history(&mut self, instrument: &InstrumentId, quote: Quote) {
        let cap = self.params.min_observation_window * 2;
        let history = self.price_history.entry(instrument.clone()).or_default();
        history.push_back(quote);
        while history.len() > cap {
            history.pop_front();
        }
    }

    fn push_deviation(&mut self, instrument: &InstrumentId, deviation: f64) {
        let cap = self.params.min_observation_window * 2;
        let history = self.deviation_history.entry(instrument.clone()).or_default();
        history.push_back(deviation);
        while history.len() > cap {
            history.pop_front();
        }
    }
}

impl MispricingDetector for StatisticalDetector {
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.pricing_model.ingest_snapshot(snapshot);
        let quotes: Vec<(InstrumentId, Quote)> = snapshot
            .quotes
            .iter()
            .map(|(id, quote)| (id.clone(), quote.clone()))
            .collect();
        for (instrument, quote) in quotes {
            self.update_price_history(&instrument, quote);
        }
        self.latest_snapshot = Some(Arc::clone(snapshot));
        self.active.sweep_expired(Utc::now(), self.expiry_callback.as_ref());
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let Some(snapshot) = self.latest_snapshot.clone() else {
            return Vec::new();
        };

        let mut opportunities = Vec::new();
        let instruments: Vec<InstrumentId> = self.price_history.keys().cloned().collect();

        for instrument in instruments {
            let observed = self.price_history[&instrument].len();
            if observed < self.params.min_observation_window {
                self.insufficient_history_skips += 1;
                continue;
            }
            let Some(quote) = snapshot.quote(&instrument) else {
                continue;
            };

            let components = [instrument.clone()];
            let synthetic = match self.pricing_model.calculate_synthetic_price(
                &instrument,
                &components,
                &snapshot,
            ) {
                Ok(synthetic) => synthetic,
                Err(err) => {
                    debug!(instrument = %instrument, %err, "skipping instrument");
                    continue;
                }
            };
            if synthetic.theoretical_price <= 0.0 {
                continue;
            }

            let market_price = quote.mid();
            let deviation =
                (market_price - synthetic.theoretical_price) / synthetic.theoretical_price;

            let history: Vec<f64> = self
                .deviation_history
                .get(&instrument)
                .map(|h| h.iter().copied().collect())
                .unwrap_or_default();
            self.push_deviation(&instrument, deviation);

            let z = z_score(&history, deviation);
            let confidence = synthetic.confidence_score;

            if !self.params.is_significant(deviation, z, confidence) {
                continue;
            }

            let size = quote.bid_size.min(quote.ask_size);
            let edge = (market_price - synthetic.theoretical_price).abs();
            let mut opportunity = MispricingOpportunity::new(
                instrument.clone(),
                MispricingType::StatisticalArbitrage,
                market_price,
                synthetic.theoretical_price,
                self.params.max_opportunity_duration,
            );
            opportunity.component_instruments = synthetic.component_instruments.clone();
            opportunity.weights = synthetic.weights.clone();
            opportunity.severity = MispricingSeverity::from_deviation(deviation);
            opportunity.z_score = z;
            opportunity.confidence_level = confidence;
            opportunity.expected_profit = edge * size;
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
