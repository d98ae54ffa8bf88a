//! Real-time basis monitoring for (spot, derivative) pairs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;

use crate::config::DEFAULT_FUNDING_RATE;
use crate::detectors::detector::{
    ActiveOpportunities, DetectionCallback, ExpiryCallback, MispricingDetector,
};
use crate::types::{
    BasisCalculation, DetectionParameters, InstrumentId, MarketSnapshot, MispricingOpportunity,
    MispricingSeverity, MispricingType,
};
use crate::utils::z_score;

type PairKey = (InstrumentId, InstrumentId);

/// Watches basis = derivative_mid - spot_mid for registered pairs against
/// the funding-implied theoretical basis, with a rolling z-score over the
/// basis history. The z gate only applies once the history is deep enough
/// to make it meaningful.
pub struct BasisCalculator {
    params: DetectionParameters,
    pairs: Vec<PairKey>,
    basis_history: HashMap<PairKey, VecDeque<f64>>,
    active: ActiveOpportunities,
    latest_snapshot: Option<Arc<MarketSnapshot>>,
    detection_callback: Option<DetectionCallback>,
    expiry_callback: Option<ExpiryCallback>,
}

impl BasisCalculator {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            params,
            pairs: Vec::new(),
            basis_history: HashMap::new(),
            active: ActiveOpportunities::new(),
            latest_snapshot: None,
            detection_callback: None,
            expiry_callback: None,
        }
    }

    pub fn add_instrument_pair(
        &mut self,
        spot: impl Into<InstrumentId>,
        derivative: impl Into<InstrumentId>,
    ) {
        let key = (spot.into(), derivative.into());
        if !self.pairs.contains(&key) {
            self.pairs.push(key);
        }
    }

    pub fn get_active_opportunities(&self) -> Vec<MispricingOpportunity> {
        self.active.snapshot()
    }

    /// Latest basis observation for a registered pair, if both legs quote.
    pub fn current_basis(&self, spot: &str, derivative: &str) -> Option<BasisCalculation> {
        let snapshot = self.latest_snapshot.as_ref()?;
        self.compute_basis(snapshot, &(spot.to_string(), derivative.to_string()))
    }

    fn compute_basis(
        &self,
        snapshot: &MarketSnapshot,
        pair: &PairKey,
    ) -> Option<BasisCalculation> {
        let spot = snapshot.quote(&pair.0)?;
        let derivative = snapshot.quote(&pair.1)?;
        let spot_mid = spot.mid();
        if spot_mid <= 0.0 {
            return None;
        }

        let funding = snapshot
            .funding_rate(&pair.1)
            .unwrap_or(DEFAULT_FUNDING_RATE);
        let basis = derivative.mid() - spot_mid;
        let theoretical = spot_mid * funding;

        let history: Vec<f64> = self
            .basis_history
            .get(pair)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();

        Some(BasisCalculation {
            spot_instrument: pair.0.clone(),
            derivative_instrument: pair.1.clone(),
            spot_price: spot_mid,
            derivative_price: derivative.mid(),
            basis_value: basis,
            theoretical_basis: theoretical,
            basis_deviation: (basis - theoretical) / spot_mid,
            z_score: z_score(&history, basis),
            calculation_time: snapshot.snapshot_time,
        })
    }

    fn push_basis(&mut self, pair: &PairKey, basis: f64) {
        let cap = self.params.min_observation_window * 2;
        let history = self.basis_history.entry(pair.clone()).or_default();
        history.push_back(basis);
        while history.len() > cap {
            history.pop_front();
        }
    }
}

impl MispricingDetector for BasisCalculator {
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.latest_snapshot = Some(Arc::clone(snapshot));
        self.active.sweep_expired(Utc::now(), self.expiry_callback.as_ref());
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let Some(snapshot) = self.latest_snapshot.clone() else {
            return Vec::new();
        };

        let mut opportunities = Vec::new();
        let pairs = self.pairs.clone();
        for pair in pairs {
            let Some(calc) = self.compute_basis(&snapshot, &pair) else {
                continue;
            };
            let history_len = self.basis_history.get(&pair).map_or(0, VecDeque::len);
            self.push_basis(&pair, calc.basis_value);

            if calc.basis_deviation.abs() <= self.params.min_deviation_threshold {
                continue;
            }
            // With a full window the excess basis must also be unusual
            // against its own history.
            if history_len >= self.params.min_observation_window
                && calc.z_score.abs() <= self.params.min_z_score
            {
                continue;
            }

            let mut opportunity = MispricingOpportunity::new(
                pair.1.clone(),
                MispricingType::SpreadAnomaly,
                calc.derivative_price,
                calc.spot_price + calc.theoretical_basis,
                self.params.max_opportunity_duration,
            );
            opportunity.component_instruments = vec![pair.0.clone()];
            opportunity.weights = vec![1.0];
            opportunity.deviation_percentage = calc.basis_deviation;
            opportunity.severity = MispricingSeverity::from_deviation(calc.basis_deviation);
            opportunity.z_score = if history_len >= self.params.min_observation_window {
                calc.z_score
            } else {
                (calc.basis_deviation / self.params.min_deviation_threshold)
                    * self.params.min_z_score
            };
            opportunity.confidence_level = 1.0;
            opportunity.expected_profit = (calc.basis_value - calc.theoretical_basis).abs();
            opportunity.max_loss = calc.theoretical_basis.abs();

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
