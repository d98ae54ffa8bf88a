//! The four validation gates every opportunity must pass

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{EngineError, EngineResult, ValidationStage};
use crate::types::{ArbitrageOpportunity, ArbitrageParameters, MarketSnapshot, Side};

/// Each leg must find its full size on the opposing side of the book.
pub fn validate_liquidity(
    opportunity: &ArbitrageOpportunity,
    snapshot: &MarketSnapshot,
) -> EngineResult<()> {
    for leg in &opportunity.legs {
        let quote = snapshot.quote(&leg.instrument_id).ok_or_else(|| {
            EngineError::validation(
                ValidationStage::Liquidity,
                format!("no quote for {}", leg.instrument_id),
            )
        })?;
        let available = match leg.side {
            Side::Bid => quote.ask_size,
            Side::Ask => quote.bid_size,
        };
        if available < leg.size {
            return Err(EngineError::validation(
                ValidationStage::Liquidity,
                format!(
                    "{} needs {:.4} but only {:.4} at top of book",
                    leg.instrument_id, leg.size, available
                ),
            ));
        }
    }
    Ok(())
}

pub fn validate_risk_limits(
    opportunity: &ArbitrageOpportunity,
    params: &ArbitrageParameters,
) -> EngineResult<()> {
    if opportunity.expected_profit < params.min_profit_threshold * opportunity.total_cost {
        return Err(EngineError::validation(
            ValidationStage::Risk,
            format!(
                "expected profit {:.2} below {:.4} of cost {:.2}",
                opportunity.expected_profit, params.min_profit_threshold, opportunity.total_cost
            ),
        ));
    }
    if opportunity.value_at_risk > params.max_risk_per_trade * opportunity.total_cost {
        return Err(EngineError::validation(
            ValidationStage::Risk,
            format!("VaR {:.2} over per-trade budget", opportunity.value_at_risk),
        ));
    }
    if opportunity.correlation_risk > params.max_correlation_risk {
        return Err(EngineError::validation(
            ValidationStage::Risk,
            format!(
                "correlation risk {:.2} over {:.2}",
                opportunity.correlation_risk, params.max_correlation_risk
            ),
        ));
    }
    if opportunity.market_impact > params.max_market_impact {
        return Err(EngineError::validation(
            ValidationStage::Risk,
            format!("market impact {:.5} over limit", opportunity.market_impact),
        ));
    }
    Ok(())
}

/// Not yet expired, and enough headroom left to execute.
pub fn validate_timing(
    opportunity: &ArbitrageOpportunity,
    params: &ArbitrageParameters,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    if now >= opportunity.expiry_time {
        return Err(EngineError::validation(
            ValidationStage::Timing,
            "opportunity already expired",
        ));
    }
    if opportunity.expiry_time - now < params.min_execution_window {
        return Err(EngineError::validation(
            ValidationStage::Timing,
            "not enough execution headroom before expiry",
        ));
    }
    Ok(())
}

pub fn validate_feasibility(
    opportunity: &ArbitrageOpportunity,
    params: &ArbitrageParameters,
) -> EngineResult<()> {
    if opportunity.total_cost > params.max_position_size {
        return Err(EngineError::validation(
            ValidationStage::Feasibility,
            format!(
                "total position {:.0} over {:.0} cap",
                opportunity.total_cost, params.max_position_size
            ),
        ));
    }
    if opportunity.slippage_estimate > params.max_slippage {
        return Err(EngineError::validation(
            ValidationStage::Feasibility,
            format!(
                "slippage estimate {:.5} over {:.5}",
                opportunity.slippage_estimate, params.max_slippage
            ),
        ));
    }
    Ok(())
}

/// All four gates in order; the first failure wins.
pub fn validate_all(
    opportunity: &ArbitrageOpportunity,
    snapshot: &MarketSnapshot,
    params: &ArbitrageParameters,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    validate_liquidity(opportunity, snapshot)?;
    validate_risk_limits(opportunity, params)?;
    validate_timing(opportunity, params, now)?;
    validate_feasibility(opportunity, params)?;
    Ok(())
}

/// Per-gate outcome for reporting and demo output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub liquidity: bool,
    pub risk_limits: bool,
    pub timing: bool,
    pub feasibility: bool,
    pub all_passed: bool,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn evaluate(
        opportunity: &ArbitrageOpportunity,
        snapshot: &MarketSnapshot,
        params: &ArbitrageParameters,
        now: DateTime<Utc>,
    ) -> Self {
        let mut report = Self::default();

        let check = |result: EngineResult<()>, flag: &mut bool, warnings: &mut Vec<String>| {
            match result {
                Ok(()) => *flag = true,
                Err(err) => warnings.push(err.to_string()),
            }
        };

        check(
            validate_liquidity(opportunity, snapshot),
            &mut report.liquidity,
            &mut report.warnings,
        );
        check(
            validate_risk_limits(opportunity, params),
            &mut report.risk_limits,
            &mut report.warnings,
        );
        check(
            validate_timing(opportunity, params, now),
            &mut report.timing,
            &mut report.warnings,
        );
        check(
            validate_feasibility(opportunity, params),
            &mut report.feasibility,
            &mut report.warnings,
        );

        report.all_passed =
            report.liquidity && report.risk_limits && report.timing && report.feasibility;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArbitrageLeg, ArbitrageType, Quote};
    use chrono::Duration;

    fn opportunity(total_cost: f64, expected_profit: f64) -> ArbitrageOpportunity {
        let mut opp = ArbitrageOpportunity::new(
            "ARB_TEST".to_string(),
            ArbitrageType::StatisticalArbitrage,
            Utc::now() + Duration::minutes(30),
        );
        opp.legs.push(ArbitrageLeg::new(
            "BTC-USD",
            Side::Bid,
            total_cost / 30_000.0,
            30_000.0,
            1.0,
        ));
        opp.compute_cost_and_exposure();
        opp.expected_profit = expected_profit;
        opp
    }

    fn snapshot_with_depth(size: f64) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::empty();
        snapshot.quotes.insert(
            "BTC-USD".to_string(),
            Quote::new("BTC-USD", 29_995.0, 30_005.0, size, size),
        );
        snapshot
    }

    #[test]
    fn profit_below_threshold_fails_risk() {
        // expected 10 < 0.001 * 20000 = 20.
        let opp = opportunity(20_000.0, 10.0);
        let err = validate_risk_limits(&opp, &ArbitrageParameters::default()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ValidationFailure {
                stage: ValidationStage::Risk,
                ..
            }
        ));
    }

    #[test]
    fn profit_at_threshold_passes_risk() {
        let opp = opportunity(20_000.0, 25.0);
        assert!(validate_risk_limits(&opp, &ArbitrageParameters::default()).is_ok());
    }

    #[test]
    fn thin_book_fails_liquidity() {
        let opp = opportunity(300_000.0, 500.0); // 10 BTC leg
        let snapshot = snapshot_with_depth(2.0);
        let err = validate_liquidity(&opp, &snapshot).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ValidationFailure {
                stage: ValidationStage::Liquidity,
                ..
            }
        ));
        let deep = snapshot_with_depth(50.0);
        assert!(validate_liquidity(&opp, &deep).is_ok());
    }

    #[test]
    fn expired_and_tight_deadlines_fail_timing() {
        let params = ArbitrageParameters::default();
        let mut opp = opportunity(20_000.0, 100.0);

        opp.expiry_time = Utc::now() - Duration::milliseconds(1);
        assert!(validate_timing(&opp, &params, Utc::now()).is_err());

        opp.expiry_time = Utc::now() + Duration::minutes(2);
        assert!(validate_timing(&opp, &params, Utc::now()).is_err());

        opp.expiry_time = Utc::now() + Duration::minutes(10);
        assert!(validate_timing(&opp, &params, Utc::now()).is_ok());
    }

    #[test]
    fn oversized_or_slippy_fails_feasibility() {
        let params = ArbitrageParameters::default();
        let mut opp = opportunity(2_000_000.0, 5_000.0);
        assert!(validate_feasibility(&opp, &params).is_err());

        opp = opportunity(20_000.0, 100.0);
        opp.slippage_estimate = 0.01;
        assert!(validate_feasibility(&opp, &params).is_err());

        opp.slippage_estimate = 0.0005;
        assert!(validate_feasibility(&opp, &params).is_ok());
    }

    #[test]
    fn report_collects_every_failure() {
        let mut opp = opportunity(2_000_000.0, 10.0);
        opp.expiry_time = Utc::now() - Duration::seconds(1);
        let snapshot = snapshot_with_depth(0.5);
        let report = ValidationReport::evaluate(
            &opp,
            &snapshot,
            &ArbitrageParameters::default(),
            Utc::now(),
        );
        assert!(!report.all_passed);
        assert!(!report.liquidity);
        assert!(!report.risk_limits);
        assert!(!report.timing);
        assert!(!report.feasibility);
        assert_eq!(report.warnings.len(), 4);
    }
}
