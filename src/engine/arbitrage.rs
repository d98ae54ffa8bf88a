//! Mispricing-to-opportunity conversion, validation, and lifecycle

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_PAIRWISE_CORRELATION, DEFAULT_PORTFOLIO_SIGMA, ES_TO_VAR_RATIO, TRANSACTION_COST_RATE,
    VAR_CONFIDENCE_MULTIPLIER,
};
use crate::engine::id_gen::{OpportunityIdGenerator, RandomIdGenerator};
use crate::errors::{EngineError, EngineResult, ValidationStage};
use crate::risk::PositionSizer;
use crate::types::{
    ArbitrageLeg, ArbitrageOpportunity, ArbitrageParameters, ArbitrageStatus, ArbitrageType,
    InstrumentId, MarketSnapshot, MispricingOpportunity, MispricingType, RiskParameters, Side,
};
use crate::validation::validate_all;

pub type ArbitrageCallback = Arc<dyn Fn(&ArbitrageOpportunity) + Send + Sync>;

#[derive(Debug, Default, Clone)]
pub struct EngineCounters {
    pub mispricings_received: u64,
    pub opportunities_identified: u64,
    pub opportunities_validated: u64,
    pub failures_liquidity: u64,
    pub failures_risk: u64,
    pub failures_timing: u64,
    pub failures_feasibility: u64,
    pub opportunities_expired: u64,
    pub opportunities_completed: u64,
    pub skipped_unknown_instrument: u64,
    pub skipped_model_domain: u64,
}

impl EngineCounters {
    fn record_failure(&mut self, stage: ValidationStage) {
        match stage {
            ValidationStage::Liquidity => self.failures_liquidity += 1,
            ValidationStage::Risk => self.failures_risk += 1,
            ValidationStage::Timing => self.failures_timing += 1,
            ValidationStage::Feasibility => self.failures_feasibility += 1,
        }
    }
}

/// Turns mispricings into sized multi-leg opportunities, validates them,
/// and owns every opportunity record from identification to its terminal
/// state. Runs on a single logical thread; the active list is behind a
/// mutex and iteration hands out defensive copies.
pub struct ArbitrageEngine {
    params: ArbitrageParameters,
    sizer: PositionSizer,
    portfolio_value: f64,
    id_generator: Box<dyn OpportunityIdGenerator>,
    latest_snapshot: Option<Arc<MarketSnapshot>>,
    pending_mispricings: VecDeque<MispricingOpportunity>,
    active: Mutex<Vec<ArbitrageOpportunity>>,
    correlation_cache: HashMap<(InstrumentId, InstrumentId), f64>,
    /// Basket-model portfolio volatility, when one is wired in.
    portfolio_sigma: Option<f64>,
    opportunity_callback: Option<ArbitrageCallback>,
    update_callback: Option<ArbitrageCallback>,
    failure_callback: Option<ArbitrageCallback>,
    counters: EngineCounters,
}

impl ArbitrageEngine {
    pub fn new(
        params: ArbitrageParameters,
        risk_params: RiskParameters,
        portfolio_value: f64,
    ) -> Self {
        Self {
            params,
            sizer: PositionSizer::new(risk_params),
            portfolio_value,
            id_generator: Box::new(RandomIdGenerator::default()),
            latest_snapshot: None,
            pending_mispricings: VecDeque::new(),
            active: Mutex::new(Vec::new()),
            correlation_cache: HashMap::new(),
            portfolio_sigma: None,
            opportunity_callback: None,
            update_callback: None,
            failure_callback: None,
            counters: EngineCounters::default(),
        }
    }

    pub fn with_id_generator(mut self, generator: Box<dyn OpportunityIdGenerator>) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn update_parameters(&mut self, params: ArbitrageParameters) {
        self.params = params;
    }

    pub fn set_portfolio_sigma(&mut self, sigma: Option<f64>) {
        self.portfolio_sigma = sigma;
    }

    pub fn cache_correlation(
        &mut self,
        a: impl Into<InstrumentId>,
        b: impl Into<InstrumentId>,
        rho: f64,
    ) {
        self.correlation_cache
            .insert((a.into(), b.into()), rho.clamp(-1.0, 1.0));
    }

    pub fn set_opportunity_callback(&mut self, callback: ArbitrageCallback) {
        self.opportunity_callback = Some(callback);
    }

    pub fn set_update_callback(&mut self, callback: ArbitrageCallback) {
        self.update_callback = Some(callback);
    }

    pub fn set_failure_callback(&mut self, callback: ArbitrageCallback) {
        self.failure_callback = Some(callback);
    }

    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    pub fn get_active_opportunities(&self) -> Vec<ArbitrageOpportunity> {
        self.active.lock().unwrap().clone()
    }

    pub fn get_opportunity_by_id(&self, opportunity_id: &str) -> Option<ArbitrageOpportunity> {
        self.active
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.opportunity_id == opportunity_id)
            .cloned()
    }

    pub fn clear_opportunities(&self) {
        self.active.lock().unwrap().clear();
    }

    /// Store the newest snapshot and run the expiry sweep.
    pub fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.latest_snapshot = Some(Arc::clone(snapshot));
        self.sweep_expired();
    }

    fn sweep_expired(&mut self) {
        let now = Utc::now();
        let mut expired = Vec::new();
        {
            let mut active = self.active.lock().unwrap();
            for opportunity in active.iter_mut() {
                if !opportunity.status.is_terminal() && opportunity.is_expired(now) {
                    opportunity.transition_to(ArbitrageStatus::Expired);
                    expired.push(opportunity.clone());
                }
            }
            // Terminal records are released after their callbacks fired.
            active.retain(|o| !o.status.is_terminal());
        }
        self.counters.opportunities_expired += expired.len() as u64;
        if let Some(callback) = &self.update_callback {
            for opportunity in &expired {
                callback(opportunity);
            }
        }
    }

    /// Queue a mispricing and drain the queue: build, validate, promote
    /// or fail each one.
    pub fn process_mispricing(&mut self, mispricing: MispricingOpportunity) {
        self.counters.mispricings_received += 1;
        self.pending_mispricings.push_back(mispricing);

        while let Some(next) = self.pending_mispricings.pop_front() {
            match self.create_from_mispricing(&next) {
                Ok(mut opportunity) => {
                    self.counters.opportunities_identified += 1;
                    self.finalize(&mut opportunity);
                }
                Err(EngineError::UnknownInstrument(instrument)) => {
                    self.counters.skipped_unknown_instrument += 1;
                    debug!(%instrument, "mispricing references unknown instrument");
                }
                Err(err) => {
                    self.counters.skipped_model_domain += 1;
                    debug!(%err, "mispricing skipped");
                }
            }
        }
    }

    /// Validate, then either promote into the active set (with callback)
    /// or mark Failed.
    fn finalize(&mut self, opportunity: &mut ArbitrageOpportunity) {
        match self.validate_opportunity(opportunity) {
            Ok(()) => {
                self.counters.opportunities_validated += 1;
                info!(
                    opportunity_id = %opportunity.opportunity_id,
                    expected_profit = opportunity.expected_profit,
                    total_cost = opportunity.total_cost,
                    "validated arbitrage opportunity"
                );
                self.active.lock().unwrap().push(opportunity.clone());
                if let Some(callback) = &self.opportunity_callback {
                    callback(opportunity);
                }
            }
            Err(err) => {
                if let EngineError::ValidationFailure { stage, .. } = &err {
                    self.counters.record_failure(*stage);
                }
                opportunity.transition_to(ArbitrageStatus::Failed);
                warn!(
                    opportunity_id = %opportunity.opportunity_id,
                    %err,
                    "arbitrage opportunity rejected"
                );
                if let Some(callback) = &self.failure_callback {
                    callback(opportunity);
                }
            }
        }
    }

    /// All four validation gates; transitions to Validated on success.
    pub fn validate_opportunity(
        &self,
        opportunity: &mut ArbitrageOpportunity,
    ) -> EngineResult<()> {
        let snapshot = self.latest_snapshot.as_ref().ok_or_else(|| {
            EngineError::validation(ValidationStage::Liquidity, "no market snapshot yet")
        })?;
        validate_all(opportunity, snapshot, &self.params, Utc::now())?;
        opportunity.transition_to(ArbitrageStatus::Validated);
        Ok(())
    }

    pub fn update_opportunity_status(&mut self, opportunity_id: &str, status: ArbitrageStatus) {
        let mut updated = None;
        {
            let mut active = self.active.lock().unwrap();
            if let Some(opportunity) = active
                .iter_mut()
                .find(|o| o.opportunity_id == opportunity_id)
            {
                if opportunity.transition_to(status) {
                    if status == ArbitrageStatus::Completed {
                        self.counters.opportunities_completed += 1;
                    }
                    updated = Some(opportunity.clone());
                } else {
                    warn!(
                        opportunity_id,
                        from = ?opportunity.status,
                        to = ?status,
                        "rejected status transition"
                    );
                }
            }
        }
        if let Some(opportunity) = updated {
            if let Some(callback) = &self.update_callback {
                callback(&opportunity);
            }
        }
    }

    fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.correlation_cache
            .get(&(a.to_string(), b.to_string()))
            .or_else(|| self.correlation_cache.get(&(b.to_string(), a.to_string())))
            .copied()
            .unwrap_or(DEFAULT_PAIRWISE_CORRELATION)
    }

    fn correlation_risk(&self, legs: &[ArbitrageLeg]) -> f64 {
        let mut max_rho = 0.0_f64;
        for (i, a) in legs.iter().enumerate() {
            for b in legs.iter().skip(i + 1) {
                if a.instrument_id == b.instrument_id {
                    continue;
                }
                max_rho = max_rho.max(self.correlation(&a.instrument_id, &b.instrument_id).abs());
            }
        }
        max_rho
    }

    /// Parametric VaR on the package's net exposure: the hedge legs are
    /// there precisely to collapse it.
    fn value_at_risk(&self, opportunity: &ArbitrageOpportunity) -> f64 {
        let exposure = opportunity.net_exposure.abs();
        match self.portfolio_sigma {
            Some(sigma) => VAR_CONFIDENCE_MULTIPLIER * sigma * exposure,
            None => DEFAULT_PORTFOLIO_SIGMA * exposure,
        }
    }

    fn market_impact(total_volume: f64) -> f64 {
        (total_volume / 1000.0) * 0.001
    }

    fn arbitrage_type_for(mispricing_type: MispricingType) -> (ArbitrageType, &'static str) {
        match mispricing_type {
            MispricingType::CrossCurrencyTriangular => {
                (ArbitrageType::TriangularArbitrage, "TRIANG")
            }
            MispricingType::CrossExchangeArbitrage | MispricingType::RealTimePriceDiscrepancy => {
                (ArbitrageType::CrossExchangeSyntheticReplication, "ARB")
            }
            MispricingType::SpotVsSyntheticDerivative | MispricingType::SpreadAnomaly => {
                (ArbitrageType::SpotFundingSyntheticPerpetual, "ARB")
            }
            MispricingType::StatisticalArbitrage | MispricingType::MeanReversion => {
                (ArbitrageType::StatisticalArbitrage, "ARB")
            }
            MispricingType::VolatilityArbitrage => (ArbitrageType::InterMarketSpread, "ARB"),
        }
    }

    /// Build the sized multi-leg opportunity for a mispricing: primary leg
    /// on the target, one hedge leg per component, entry prices from the
    /// side-appropriate quote.
    fn create_from_mispricing(
        &self,
        mispricing: &MispricingOpportunity,
    ) -> EngineResult<ArbitrageOpportunity> {
        let snapshot = self
            .latest_snapshot
            .as_ref()
            .ok_or_else(|| EngineError::UnknownInstrument(mispricing.target_instrument.clone()))?;
        let target_quote = snapshot
            .quote(&mispricing.target_instrument)
            .ok_or_else(|| {
                EngineError::UnknownInstrument(mispricing.target_instrument.clone())
            })?;

        // Buy what trades below fair value, sell what trades above it.
        let buying = mispricing.market_price < mispricing.theoretical_price;
        let primary_side = if buying { Side::Bid } else { Side::Ask };
        let entry_price = match primary_side {
            Side::Bid => target_quote.ask_price,
            Side::Ask => target_quote.bid_price,
        };
        if entry_price <= 0.0 {
            return Err(EngineError::model_domain("one-sided target quote"));
        }

        let sigma = self.portfolio_sigma.unwrap_or(DEFAULT_PORTFOLIO_SIGMA);
        let inputs = self.sizer.inputs_from_mispricing(
            mispricing,
            self.portfolio_value,
            entry_price,
            sigma,
        );
        let base_size = self.sizer.optimal_size(&inputs);
        if base_size <= 0.0 {
            return Err(EngineError::model_domain("sizer produced a zero size"));
        }

        let (arbitrage_type, prefix) = Self::arbitrage_type_for(mispricing.mispricing_type);
        let mut opportunity = ArbitrageOpportunity::new(
            self.id_generator.next_id(prefix),
            arbitrage_type,
            mispricing.expiry_time,
        );
        opportunity.mispricing_source = Some(mispricing.clone());

        opportunity.legs.push(ArbitrageLeg::new(
            mispricing.target_instrument.clone(),
            primary_side,
            base_size,
            entry_price,
            1.0,
        ));

        for (component, weight) in mispricing
            .component_instruments
            .iter()
            .zip(&mispricing.weights)
        {
            if *component == mispricing.target_instrument || *weight == 0.0 {
                continue;
            }
            let quote = snapshot
                .quote(component)
                .ok_or_else(|| EngineError::UnknownInstrument(component.clone()))?;
            let side = if *weight > 0.0 {
                primary_side.opposite()
            } else {
                primary_side
            };
            let hedge_entry = match side {
                Side::Bid => quote.ask_price,
                Side::Ask => quote.bid_price,
            };
            if hedge_entry <= 0.0 {
                return Err(EngineError::model_domain("one-sided hedge quote"));
            }
            opportunity.legs.push(ArbitrageLeg::new(
                component.clone(),
                side,
                weight.abs() * base_size,
                hedge_entry,
                -weight,
            ));
        }

        opportunity.compute_cost_and_exposure();

        opportunity.expected_profit = mispricing.expected_profit;
        opportunity.max_loss = mispricing.max_loss;
        opportunity.profit_probability = mispricing.confidence_level;
        opportunity.value_at_risk = self.value_at_risk(&opportunity);
        opportunity.expected_shortfall = opportunity.value_at_risk * ES_TO_VAR_RATIO;
        opportunity.sharpe_ratio = mispricing.sharpe_ratio;
        opportunity.correlation_risk = self.correlation_risk(&opportunity.legs);
        opportunity.market_impact = Self::market_impact(opportunity.total_volume);
        opportunity.transaction_costs = TRANSACTION_COST_RATE * opportunity.total_cost;

        // Notional-weighted half-spreads over the package.
        if opportunity.total_cost > 0.0 {
            let weighted: f64 = opportunity
                .legs
                .iter()
                .filter_map(|leg| {
                    snapshot
                        .quote(&leg.instrument_id)
                        .map(|q| leg.notional() * q.spread_ratio() / 2.0)
                })
                .sum();
            opportunity.slippage_estimate = weighted / opportunity.total_cost;
        }

        let cost_drag = opportunity.slippage_estimate + TRANSACTION_COST_RATE;
        opportunity.break_even_price = if buying {
            entry_price * (1.0 + cost_drag)
        } else {
            entry_price * (1.0 - cost_drag)
        };

        let remaining = (mispricing.expiry_time - Utc::now()).num_milliseconds();
        opportunity.estimated_duration_ms =
            remaining.min(self.params.max_holding_period.num_milliseconds()).max(0);

        Ok(opportunity)
    }

    /// Direct cross-venue scan over the latest snapshot: buy the lowest
    /// ask and sell the highest bid wherever venues diverge. Valid
    /// opportunities are promoted exactly like mispricing-derived ones.
    pub fn identify_opportunities(&mut self) -> Vec<ArbitrageOpportunity> {
        let Some(snapshot) = self.latest_snapshot.clone() else {
            return Vec::new();
        };

        let mut identified = Vec::new();
        for (instrument, venues) in &snapshot.exchange_quotes {
            if venues.len() < 2 {
                continue;
            }
            let best_ask = venues
                .values()
                .filter(|q| q.ask_price > 0.0)
                .min_by(|a, b| a.ask_price.partial_cmp(&b.ask_price).unwrap());
            let best_bid = venues
                .values()
                .filter(|q| q.bid_price > 0.0)
                .max_by(|a, b| a.bid_price.partial_cmp(&b.bid_price).unwrap());
            let (Some(buy), Some(sell)) = (best_ask, best_bid) else {
                continue;
            };
            let spread = sell.bid_price - buy.ask_price;
            if spread <= 0.0 {
                continue;
            }

            let parity = self.sizer.risk_parity_size(
                self.portfolio_value,
                buy.ask_price,
                2,
            );
            let size = parity.min(buy.ask_size).min(sell.bid_size);
            if size <= 0.0 {
                continue;
            }

            let mut opportunity = ArbitrageOpportunity::new(
                self.id_generator.next_id("ARB"),
                ArbitrageType::CrossExchangeSyntheticReplication,
                snapshot.snapshot_time + self.params.max_holding_period,
            );
            opportunity.legs.push(ArbitrageLeg::new(
                instrument.clone(),
                Side::Bid,
                size,
                buy.ask_price,
                1.0,
            ));
            opportunity.legs.push(ArbitrageLeg::new(
                instrument.clone(),
                Side::Ask,
                size,
                sell.bid_price,
                -1.0,
            ));
            opportunity.compute_cost_and_exposure();
            opportunity.expected_profit = spread * size;
            opportunity.max_loss = (buy.spread() + sell.spread()) * size;
            opportunity.profit_probability = self.params.confidence_threshold;
            opportunity.value_at_risk = self.value_at_risk(&opportunity);
            opportunity.expected_shortfall = opportunity.value_at_risk * ES_TO_VAR_RATIO;
            opportunity.market_impact = Self::market_impact(opportunity.total_volume);
            opportunity.transaction_costs = TRANSACTION_COST_RATE * opportunity.total_cost;

            self.counters.opportunities_identified += 1;
            self.finalize(&mut opportunity);
            identified.push(opportunity);
        }
        identified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::id_gen::SequentialIdGenerator;
    use crate::types::{MispricingSeverity, Quote};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> ArbitrageEngine {
        let mut engine = ArbitrageEngine::new(
            ArbitrageParameters::default(),
            RiskParameters::default(),
            1_000_000.0,
        )
        .with_id_generator(Box::new(SequentialIdGenerator::default()));
        engine.cache_correlation("BTC-PERP", "BTC-USD", 0.2);
        engine
    }

    fn snapshot() -> Arc<MarketSnapshot> {
        let mut snapshot = MarketSnapshot::empty();
        for quote in [
            Quote::new("BTC-USD", 29_995.0, 30_005.0, 1_000.0, 1_000.0),
            Quote::new("BTC-PERP", 30_195.0, 30_205.0, 1_000.0, 1_000.0),
        ] {
            snapshot.snapshot_time = quote.timestamp;
            snapshot
                .quotes
                .insert(quote.instrument_id.clone(), quote);
        }
        Arc::new(snapshot)
    }

    fn rich_perp_mispricing(expected_profit: f64) -> MispricingOpportunity {
        let mut m = MispricingOpportunity::new(
            "BTC-PERP",
            MispricingType::SpotVsSyntheticDerivative,
            30_200.0,
            30_015.0,
            Duration::minutes(30),
        );
        m.component_instruments = vec!["BTC-USD".to_string()];
        m.weights = vec![1.0];
        m.severity = MispricingSeverity::Low;
        m.z_score = 2.5;
        m.confidence_level = 0.9;
        m.expected_profit = expected_profit;
        m.max_loss = 100.0;
        m
    }

    #[test]
    fn profitable_mispricing_is_validated_and_promoted() {
        let mut engine = engine();
        engine.update_market_data(&snapshot());

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        engine.set_opportunity_callback(Arc::new(move |opp| {
            assert_eq!(opp.status, ArbitrageStatus::Validated);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        engine.process_mispricing(rich_perp_mispricing(300.0));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(engine.counters().opportunities_validated, 1);
        let active = engine.get_active_opportunities();
        assert_eq!(active.len(), 1);
        let opp = &active[0];
        assert_eq!(opp.status, ArbitrageStatus::Validated);
        assert!(opp.validation_time.is_some());
        // Market above fair value: the primary leg sells the perp and the
        // positive-weight hedge buys the spot.
        assert_eq!(opp.legs.len(), 2);
        assert_eq!(opp.legs[0].side, Side::Ask);
        assert_eq!(opp.legs[0].entry_price, 30_195.0);
        assert_eq!(opp.legs[1].side, Side::Bid);
        assert_eq!(opp.legs[1].entry_price, 30_005.0);
        // total_cost populated at construction.
        let expected_cost: f64 = opp.legs.iter().map(|l| l.size * l.entry_price).sum();
        assert!((opp.total_cost - expected_cost).abs() < 1e-9);
        assert!(opp.total_cost > 0.0);
    }

    #[test]
    fn thin_profit_fails_risk_validation_without_callback() {
        let mut engine = engine();
        engine.update_market_data(&snapshot());

        let validated = Arc::new(AtomicUsize::new(0));
        let validated_counter = Arc::clone(&validated);
        engine.set_opportunity_callback(Arc::new(move |_| {
            validated_counter.fetch_add(1, Ordering::SeqCst);
        }));
        let failed = Arc::new(AtomicUsize::new(0));
        let failed_counter = Arc::clone(&failed);
        engine.set_failure_callback(Arc::new(move |opp| {
            assert_eq!(opp.status, ArbitrageStatus::Failed);
            failed_counter.fetch_add(1, Ordering::SeqCst);
        }));

        // Expected profit far below min_profit_threshold * total_cost.
        engine.process_mispricing(rich_perp_mispricing(30.0));

        assert_eq!(validated.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.counters().failures_risk, 1);
        assert!(engine.get_active_opportunities().is_empty());
    }

    #[test]
    fn unknown_component_is_counted_and_skipped() {
        let mut engine = engine();
        engine.update_market_data(&snapshot());
        let mut m = rich_perp_mispricing(300.0);
        m.component_instruments = vec!["SOL-USD".to_string()];
        engine.process_mispricing(m);
        assert_eq!(engine.counters().skipped_unknown_instrument, 1);
        assert!(engine.get_active_opportunities().is_empty());
    }

    #[test]
    fn expiry_sweep_fires_update_exactly_once() {
        let mut engine = engine();
        engine.update_market_data(&snapshot());
        engine.process_mispricing(rich_perp_mispricing(300.0));
        let id = engine.get_active_opportunities()[0].opportunity_id.clone();

        // Force the active record past its expiry.
        {
            let mut active = engine.active.lock().unwrap();
            active[0].expiry_time = Utc::now() - Duration::milliseconds(1);
        }

        let expired = Arc::new(AtomicUsize::new(0));
        let expired_counter = Arc::clone(&expired);
        engine.set_update_callback(Arc::new(move |opp| {
            assert_eq!(opp.status, ArbitrageStatus::Expired);
            expired_counter.fetch_add(1, Ordering::SeqCst);
        }));

        engine.update_market_data(&snapshot());
        assert_eq!(expired.load(Ordering::SeqCst), 1);
        assert_eq!(engine.counters().opportunities_expired, 1);
        assert!(engine.get_opportunity_by_id(&id).is_none());

        // A second sweep must not refire.
        engine.update_market_data(&snapshot());
        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn triangular_mispricings_get_the_triang_prefix() {
        let mut engine = engine();
        let mut snapshot_inner = MarketSnapshot::empty();
        for quote in [
            Quote::new("BTC-USD", 30_000.0, 30_010.0, 1_000.0, 1_000.0),
            Quote::new("ETH-USD", 2_000.0, 2_002.0, 1_000.0, 1_000.0),
            Quote::new("BTC-ETH", 15.10, 15.12, 1_000.0, 1_000.0),
        ] {
            snapshot_inner.snapshot_time = quote.timestamp;
            snapshot_inner
                .quotes
                .insert(quote.instrument_id.clone(), quote);
        }
        engine.update_market_data(&Arc::new(snapshot_inner));

        let mut m = MispricingOpportunity::new(
            "BTC-USD",
            MispricingType::CrossCurrencyTriangular,
            30_005.0,
            30_200.0,
            Duration::minutes(30),
        );
        m.component_instruments = vec!["BTC-ETH".to_string(), "ETH-USD".to_string()];
        m.weights = vec![1.0, 15.1];
        m.confidence_level = 1.0;
        m.expected_profit = 500.0;
        m.max_loss = 100.0;
        engine.cache_correlation("BTC-USD", "BTC-ETH", 0.2);
        engine.cache_correlation("BTC-USD", "ETH-USD", 0.2);
        engine.cache_correlation("BTC-ETH", "ETH-USD", 0.2);
        engine.process_mispricing(m);

        let active = engine.get_active_opportunities();
        assert_eq!(active.len(), 1);
        assert!(active[0].opportunity_id.starts_with("TRIANG_"));
        assert_eq!(active[0].arbitrage_type, ArbitrageType::TriangularArbitrage);
    }

    #[test]
    fn status_transitions_are_monotonic_through_the_engine() {
        let mut engine = engine();
        engine.update_market_data(&snapshot());
        engine.process_mispricing(rich_perp_mispricing(300.0));
        let id = engine.get_active_opportunities()[0].opportunity_id.clone();

        engine.update_opportunity_status(&id, ArbitrageStatus::Executing);
        assert_eq!(
            engine.get_opportunity_by_id(&id).unwrap().status,
            ArbitrageStatus::Executing
        );

        // Backwards transition is rejected.
        engine.update_opportunity_status(&id, ArbitrageStatus::Identified);
        assert_eq!(
            engine.get_opportunity_by_id(&id).unwrap().status,
            ArbitrageStatus::Executing
        );

        engine.update_opportunity_status(&id, ArbitrageStatus::Completed);
        assert_eq!(engine.counters().opportunities_completed, 1);
        // Completed records are released on the next sweep.
        engine.update_market_data(&snapshot());
        assert!(engine.get_opportunity_by_id(&id).is_none());
    }

    #[test]
    fn identify_opportunities_scans_cross_venue_spreads() {
        let mut engine = engine();
        let mut snap = MarketSnapshot::empty();
        let x = Quote::new("BTC-USD", 29_990.0, 30_000.0, 500.0, 500.0);
        let y = Quote::new("BTC-USD", 30_150.0, 30_160.0, 500.0, 500.0);
        snap.snapshot_time = y.timestamp;
        snap.quotes.insert("BTC-USD".to_string(), x.clone());
        snap.exchange_quotes.insert(
            "BTC-USD".to_string(),
            HashMap::from([("OKX".to_string(), x), ("BINANCE".to_string(), y)]),
        );
        engine.update_market_data(&Arc::new(snap));

        let identified = engine.identify_opportunities();
        assert_eq!(identified.len(), 1);
        let opp = &identified[0];
        assert_eq!(opp.legs.len(), 2);
        assert_eq!(opp.legs[0].entry_price, 30_000.0);
        assert_eq!(opp.legs[1].entry_price, 30_150.0);
        assert!(opp.expected_profit > 0.0);
    }

    #[test]
    fn ids_are_unique_across_a_run() {
        let mut engine = engine();
        engine.update_market_data(&snapshot());
        for _ in 0..20 {
            engine.process_mispricing(rich_perp_mispricing(300.0));
        }
        let active = engine.get_active_opportunities();
        let mut ids: Vec<_> = active.iter().map(|o| o.opportunity_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), active.len());
    }
}
