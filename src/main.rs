//! Synthetic Pricing & Arbitrage Engine - Main Entry Point
//!
//! Demo loop: simulated multi-exchange feeds drive the aggregator, the
//! composite detector, and the arbitrage engine end to end.

use synth_arb_engine::*;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tokio::time;
use tracing::{error, info, warn};

use synth_arb_engine::detectors::{
    BasisCalculator, CompositeDetector, CrossExchangeDetector, MispricingDetector,
    SpotDerivativeDetector, StatisticalDetector, TriangularDetector, VolatilityDetector,
};
use synth_arb_engine::engine::ArbitrageEngine;
use synth_arb_engine::feed::{FeedAggregator, SimulatedFeed};
use synth_arb_engine::pricing::{PerpetualSwapModel, PricingParameters, StatArbModel};

struct MonitoringState {
    snapshots_published: u64,
    mispricings_detected: u64,
    opportunities_validated: Arc<AtomicU64>,
    feed_stale_ticks: u64,
}

impl MonitoringState {
    fn new() -> Self {
        Self {
            snapshots_published: 0,
            mispricings_detected: 0,
            opportunities_validated: Arc::new(AtomicU64::new(0)),
            feed_stale_ticks: 0,
        }
    }
}

fn build_feeds() -> Vec<SimulatedFeed> {
    let mut okx = SimulatedFeed::new("OKX", 42);
    okx.add_instrument("BTC-USD", 30_000.0);
    okx.add_instrument("ETH-USD", 2_000.0);
    okx.add_instrument("BTC-ETH", 15.0);
    okx.add_perpetual("BTC-PERP", 30_015.0);

    let mut binance = SimulatedFeed::new("BINANCE", 1337);
    binance.add_instrument("BTC-USD", 30_005.0);
    binance.add_instrument("ETH-USD", 2_000.5);
    binance.add_perpetual("BTC-PERP", 30_020.0);

    vec![okx, binance]
}

fn build_detector(config: &Config) -> CompositeDetector {
    let detection = config.detection.clone();
    let mut composite = CompositeDetector::new(detection.clone());

    composite.add_detector(Box::new(StatisticalDetector::new(
        Box::new(StatArbModel::new(PricingParameters::default())),
        detection.clone(),
    )));

    let mut triangular = TriangularDetector::new(detection.clone());
    triangular.add_currency_triangle(
        "BTC-ETH-USD",
        [
            "BTC-ETH".to_string(),
            "ETH-USD".to_string(),
            "BTC-USD".to_string(),
        ],
    );
    composite.add_detector(Box::new(triangular));

    composite.add_detector(Box::new(VolatilityDetector::new(detection.clone())));

    let mut basis = BasisCalculator::new(detection.clone());
    basis.add_instrument_pair("BTC-USD", "BTC-PERP");
    composite.add_detector(Box::new(basis));

    let mut cross_exchange = CrossExchangeDetector::new(detection.clone());
    cross_exchange.set_exchange_transaction_cost("OKX", 0.0005);
    cross_exchange.set_exchange_transaction_cost("BINANCE", 0.0004);
    composite.add_detector(Box::new(cross_exchange));

    let mut spot_derivative = SpotDerivativeDetector::new(
        Box::new(PerpetualSwapModel::new(PricingParameters::default())),
        detection,
    );
    spot_derivative.add_derivative_instrument("BTC-PERP", "BTC-USD");
    composite.add_detector(Box::new(spot_derivative));

    composite
}

fn build_engine(config: &Config, state: &MonitoringState) -> ArbitrageEngine {
    let mut engine = ArbitrageEngine::new(
        config.arbitrage.clone(),
        config.risk.clone(),
        config.portfolio_value,
    );
    engine.cache_correlation("BTC-PERP", "BTC-USD", 0.25);
    engine.cache_correlation("BTC-USD", "ETH-USD", 0.25);
    engine.cache_correlation("BTC-USD", "BTC-ETH", 0.25);
    engine.cache_correlation("BTC-ETH", "ETH-USD", 0.25);

    let validated = Arc::clone(&state.opportunities_validated);
    engine.set_opportunity_callback(Arc::new(move |opportunity| {
        validated.fetch_add(1, Ordering::Relaxed);
        match serde_json::to_string(opportunity) {
            Ok(json) => info!(target: "opportunities", "{json}"),
            Err(err) => error!("failed to serialize opportunity: {err}"),
        }
    }));
    engine.set_update_callback(Arc::new(|opportunity| {
        info!(
            opportunity_id = %opportunity.opportunity_id,
            status = ?opportunity.status,
            "opportunity update"
        );
    }));
    engine
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let _logging_guard = utils::setup_logging()?;
    utils::setup_output_directories()?;

    let config = CONFIG.clone();

    info!("Synthetic Pricing & Arbitrage Engine v0.5.0");
    info!("Configuration:");
    info!("   Snapshot interval: {} ms", config.snapshot_interval_ms);
    info!("   Staleness budget: {} ms", config.staleness_budget_ms);
    info!(
        "   Min deviation: {:.2}%",
        config.detection.min_deviation_threshold * 100.0
    );
    info!(
        "   Min profit threshold: {:.2}%",
        config.arbitrage.min_profit_threshold * 100.0
    );
    info!("   Portfolio value: ${:.0}", config.portfolio_value);

    let mut feeds = build_feeds();
    let mut aggregator = FeedAggregator::new(config.staleness_budget_ms);
    let mut detector = build_detector(&config);
    let state = MonitoringState::new();
    let mut engine = build_engine(&config, &state);
    let mut state = state;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    let shutdown_tx = Arc::new(tokio::sync::Mutex::new(Some(shutdown_tx)));
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.expect("ctrl-c handler");
        info!("received shutdown signal");
        if let Some(tx) = shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
    });

    info!("starting main monitoring loop");
    let start_time = Instant::now();
    let mut interval = time::interval(Duration::from_millis(config.snapshot_interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_tick(&mut feeds, &mut aggregator, &mut detector, &mut engine, &mut state);
            }
            _ = &mut shutdown_rx => {
                info!("shutdown signal received, exiting main loop");
                break;
            }
        }
    }

    print_final_statistics(start_time, &state, &aggregator, &engine);
    Ok(())
}

fn run_tick(
    feeds: &mut [SimulatedFeed],
    aggregator: &mut FeedAggregator,
    detector: &mut CompositeDetector,
    engine: &mut ArbitrageEngine,
    state: &mut MonitoringState,
) {
    for feed in feeds.iter_mut() {
        for (exchange, event) in feed.next_events() {
            aggregator.apply(&exchange, event);
        }
    }

    let snapshot = match aggregator.publish(Utc::now()) {
        Ok(snapshot) => snapshot,
        Err(EngineError::FeedStale { known_instruments }) => {
            state.feed_stale_ticks += 1;
            warn!(known_instruments, "feed stale, skipping detection pass");
            return;
        }
        Err(err) => {
            error!("snapshot failed: {err}");
            return;
        }
    };
    state.snapshots_published += 1;

    detector.update_market_data(&snapshot);
    engine.update_market_data(&snapshot);

    let mispricings = detector.detect_opportunities();
    state.mispricings_detected += mispricings.len() as u64;
    for mispricing in mispricings {
        engine.process_mispricing(mispricing);
    }
    engine.identify_opportunities();

    if state.snapshots_published % 100 == 0 {
        let counters = engine.counters();
        info!(
            snapshots = state.snapshots_published,
            mispricings = state.mispricings_detected,
            identified = counters.opportunities_identified,
            validated = counters.opportunities_validated,
            active = engine.get_active_opportunities().len(),
            "session stats"
        );
    }
}

fn print_final_statistics(
    start_time: Instant,
    state: &MonitoringState,
    aggregator: &FeedAggregator,
    engine: &ArbitrageEngine,
) {
    let feed = aggregator.counters();
    let counters = engine.counters();
    info!("shutting down gracefully");
    info!("final statistics:");
    info!("   runtime: {:?}", start_time.elapsed());
    info!("   snapshots published: {}", state.snapshots_published);
    info!(
        "   feed: {} accepted, {} dropped, {} gaps, {} crossed rejected",
        feed.events_accepted, feed.events_dropped, feed.sequence_gaps, feed.crossed_quotes_rejected
    );
    info!("   feed-stale ticks: {}", state.feed_stale_ticks);
    info!("   mispricings detected: {}", state.mispricings_detected);
    info!(
        "   opportunities: {} identified, {} validated, {} expired, {} completed",
        counters.opportunities_identified,
        counters.opportunities_validated,
        counters.opportunities_expired,
        counters.opportunities_completed
    );
    info!(
        "   validation failures: liquidity={} risk={} timing={} feasibility={}",
        counters.failures_liquidity,
        counters.failures_risk,
        counters.failures_timing,
        counters.failures_feasibility
    );
    info!(
        "   skipped: {} unknown instrument, {} model domain",
        counters.skipped_unknown_instrument, counters.skipped_model_domain
    );
    info!(
        "   validated via callback: {}",
        state.opportunities_validated.load(Ordering::Relaxed)
    );
}
