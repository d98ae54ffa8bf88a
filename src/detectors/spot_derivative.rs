//! Spot vs derivative fair-value comparison

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::detectors::detector::{
    ActiveOpportunities, DetectionCallback, ExpiryCallback, MispricingDetector,
};
use crate::pricing::PricingModel;
use crate::types::{
    DetectionParameters, InstrumentId, MarketSnapshot, MispricingOpportunity, MispricingSeverity,
    MispricingType,
};

/// Prices each registered derivative off its underlying with a pricing
/// model and emits when the quoted price strays from fair value.
pub struct SpotDerivativeDetector {
    params: DetectionParameters,
    pricing_model: Box<dyn PricingModel>,
    pairs: Vec<(InstrumentId, InstrumentId)>,
    active: ActiveOpportunities,
    latest_snapshot: Option<Arc<MarketSnapshot>>,
    detection_callback: Option<DetectionCallback>,
    expiry_callback: Option<ExpiryCallback>,
    model_error_skips: u64,
}

impl SpotDerivativeDetector {
    pub fn new(pricing_model: Box<dyn PricingModel>, params: DetectionParameters) -> Self {
        Self {
            params,
            pricing_model,
            pairs: Vec::new(),
            active: ActiveOpportunities::new(),
            latest_snapshot: None,
            detection_callback: None,
            expiry_callback: None,
            model_error_skips: 0,
        }
    }

    pub fn add_derivative_instrument(
        &mut self,
        derivative: impl Into<InstrumentId>,
        underlying: impl Into<InstrumentId>,
    ) {
        let pair = (derivative.into(), underlying.into());
        if !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
    }

    pub fn get_active_opportunities(&self) -> Vec<MispricingOpportunity> {
        self.active.snapshot()
    }

    pub fn model_error_skips(&self) -> u64 {
        self.model_error_skips
    }
}

impl MispricingDetector for SpotDerivativeDetector {
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.pricing_model.ingest_snapshot(snapshot);
        self.latest_snapshot = Some(Arc::clone(snapshot));
        self.active.sweep_expired(Utc::now(), self.expiry_callback.as_ref());
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let Some(snapshot) = self.latest_snapshot.clone() else {
            return Vec::new();
        };

        let mut opportunities = Vec::new();
        for (derivative, underlying) in self.pairs.clone() {
            let Some(quote) = snapshot.quote(&derivative) else {
                continue;
            };

            let components = [underlying.clone()];
            let synthetic = match self.pricing_model.calculate_synthetic_price(
                &derivative,
                &components,
                &snapshot,
            ) {
                Ok(synthetic) => synthetic,
                Err(err) => {
                    self.model_error_skips += 1;
                    debug!(derivative = %derivative, %err, "model skipped derivative");
                    continue;
                }
            };
            if synthetic.theoretical_price <= 0.0 {
                continue;
            }

            let market = quote.mid();
            let deviation = (market - synthetic.theoretical_price) / synthetic.theoretical_price;
            // Fair value comes straight from the model, so the reported z
            // is the deviation's multiple of the emission threshold on the
            // z scale; the shared significance gate still applies in full.
            let z_score = if self.params.min_deviation_threshold > 0.0 {
                (deviation / self.params.min_deviation_threshold) * self.params.min_z_score
            } else {
                self.params.min_z_score
            };
            let confidence = synthetic.confidence_score;
            if !self.params.is_significant(deviation, z_score, confidence) {
                continue;
            }

            let mut opportunity = MispricingOpportunity::new(
                derivative.clone(),
                MispricingType::SpotVsSyntheticDerivative,
                market,
                synthetic.theoretical_price,
                self.params.max_opportunity_duration,
            );
            opportunity.component_instruments = vec![underlying.clone()];
            opportunity.weights = vec![1.0];
            opportunity.severity = MispricingSeverity::from_deviation(deviation);
            opportunity.z_score = z_score;
            opportunity.confidence_level = confidence;
            let size = quote.bid_size.min(quote.ask_size);
            opportunity.expected_profit =
                (market - synthetic.theoretical_price).abs() * size;
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
