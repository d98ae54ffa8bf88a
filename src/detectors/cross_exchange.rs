//! Cross-exchange price spread detection

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::detectors::detector::{
    ActiveOpportunities, DetectionCallback, ExpiryCallback, MispricingDetector,
};
use crate::types::{
    CrossExchangeOpportunity, DetectionParameters, ExchangeId, MarketSnapshot,
    MispricingOpportunity, MispricingSeverity, MispricingType,
};

pub const DEFAULT_EXCHANGE_TRANSACTION_COST: f64 = 0.0005;
pub const DEFAULT_LATENCY_DISCOUNT: f64 = 0.95;

/// Scans the per-exchange quote map for instruments tradable on two or
/// more venues and sizes the buy-low/sell-high spread net of per-exchange
/// transaction costs.
pub struct CrossExchangeDetector {
    params: DetectionParameters,
    transaction_costs: HashMap<ExchangeId, f64>,
    latency_discounts: HashMap<ExchangeId, f64>,
    cross_exchange: Vec<CrossExchangeOpportunity>,
    active: ActiveOpportunities,
    latest_snapshot: Option<Arc<MarketSnapshot>>,
    detection_callback: Option<DetectionCallback>,
    expiry_callback: Option<ExpiryCallback>,
}

impl CrossExchangeDetector {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            params,
            transaction_costs: HashMap::new(),
            latency_discounts: HashMap::new(),
            cross_exchange: Vec::new(),
            active: ActiveOpportunities::new(),
            latest_snapshot: None,
            detection_callback: None,
            expiry_callback: None,
        }
    }

    pub fn set_exchange_transaction_cost(
        &mut self,
        exchange: impl Into<ExchangeId>,
        cost_percentage: f64,
    ) {
        self.transaction_costs
            .insert(exchange.into(), cost_percentage.max(0.0));
    }

    pub fn set_exchange_latency_discount(
        &mut self,
        exchange: impl Into<ExchangeId>,
        discount: f64,
    ) {
        self.latency_discounts
            .insert(exchange.into(), discount.clamp(0.0, 1.0));
    }

    fn transaction_cost(&self, exchange: &str) -> f64 {
        self.transaction_costs
            .get(exchange)
            .copied()
            .unwrap_or(DEFAULT_EXCHANGE_TRANSACTION_COST)
    }

    fn latency_discount(&self, exchange: &str) -> f64 {
        self.latency_discounts
            .get(exchange)
            .copied()
            .unwrap_or(DEFAULT_LATENCY_DISCOUNT)
    }

    pub fn get_active_cross_exchange_opportunities(&self) -> Vec<CrossExchangeOpportunity> {
        self.cross_exchange.clone()
    }

    pub fn get_active_opportunities(&self) -> Vec<MispricingOpportunity> {
        self.active.snapshot()
    }

    /// Execution probability from fill depth relative to the liquidity
    /// threshold, discounted by the slower venue.
    fn execution_probability(&self, volume: f64, buy: &str, sell: &str) -> f64 {
        let liquidity_ratio = if self.params.liquidity_threshold > 0.0 {
            (volume / self.params.liquidity_threshold).clamp(0.0, 1.0)
        } else {
            1.0
        };
        liquidity_ratio * self.latency_discount(buy).min(self.latency_discount(sell))
    }
}

impl MispricingDetector for CrossExchangeDetector {
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.latest_snapshot = Some(Arc::clone(snapshot));
        self.active.sweep_expired(Utc::now(), self.expiry_callback.as_ref());
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let Some(snapshot) = self.latest_snapshot.clone() else {
            return Vec::new();
        };

        let mut opportunities = Vec::new();
        self.cross_exchange.clear();

        for (instrument, venues) in &snapshot.exchange_quotes {
            if venues.len() < 2 {
                continue;
            }

            // Buy where the ask is lowest, sell where the bid is highest.
            let best_ask = venues
                .iter()
                .filter(|(_, q)| q.ask_price > 0.0)
                .min_by(|a, b| a.1.ask_price.partial_cmp(&b.1.ask_price).unwrap());
            let best_bid = venues
                .iter()
                .filter(|(_, q)| q.bid_price > 0.0)
                .max_by(|a, b| a.1.bid_price.partial_cmp(&b.1.bid_price).unwrap());
            let (Some((buy_venue, buy_quote)), Some((sell_venue, sell_quote))) =
                (best_ask, best_bid)
            else {
                continue;
            };
            if buy_venue == sell_venue {
                continue;
            }

            let spread = sell_quote.bid_price - buy_quote.ask_price;
            if spread <= 0.0 {
                continue;
            }

            let volume = buy_quote.ask_size.min(sell_quote.bid_size);
            if volume <= 0.0 {
                continue;
            }

            let per_unit_costs = self.transaction_cost(buy_venue) * buy_quote.ask_price
                + self.transaction_cost(sell_venue) * sell_quote.bid_price;
            let net_per_unit = spread - per_unit_costs;
            let required_capital = volume * buy_quote.ask_price;
            let net_profit = net_per_unit * volume;
            let net_return = if required_capital > 0.0 {
                net_profit / required_capital
            } else {
                0.0
            };

            let record = CrossExchangeOpportunity {
                instrument_id: instrument.clone(),
                buy_exchange: buy_venue.clone(),
                sell_exchange: sell_venue.clone(),
                buy_price: buy_quote.ask_price,
                sell_price: sell_quote.bid_price,
                price_spread: spread,
                percentage_spread: spread / buy_quote.ask_price,
                expected_profit: spread * volume,
                net_profit_after_costs: net_profit,
                required_capital,
                capital_efficiency_ratio: net_return,
                available_volume: volume,
                execution_probability: self.execution_probability(
                    volume, buy_venue, sell_venue,
                ),
                detection_time: snapshot.snapshot_time,
            };
            self.cross_exchange.push(record);

            // The spread is deterministic, so the reported z is its
            // multiple of the emission threshold on the z scale; the
            // shared significance gate still applies in full.
            let z_score = if self.params.min_deviation_threshold > 0.0 {
                (net_return / self.params.min_deviation_threshold) * self.params.min_z_score
            } else {
                self.params.min_z_score
            };
            let confidence = self.execution_probability(volume, buy_venue, sell_venue);
            if !self.params.is_significant(net_return, z_score, confidence) {
                continue;
            }

            let mut opportunity = MispricingOpportunity::new(
                instrument.clone(),
                MispricingType::CrossExchangeArbitrage,
                sell_quote.bid_price,
                buy_quote.ask_price,
                self.params.max_opportunity_duration,
            );
            opportunity.component_instruments = vec![instrument.clone()];
            opportunity.weights = vec![1.0];
            opportunity.deviation_percentage = net_return;
            opportunity.severity = MispricingSeverity::from_deviation(net_return);
            opportunity.z_score = z_score;
            opportunity.confidence_level = confidence;
            opportunity.expected_profit = net_profit;
            opportunity.max_loss = per_unit_costs * volume;

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
