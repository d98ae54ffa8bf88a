//! Confidence scoring for synthetic prices
//!
//! A synthetic price is only as good as its inputs. Every model scores its
//! result as min(freshness, spread tightness, sample sufficiency), each
//! factor a linear fall-off past its threshold.

use chrono::{DateTime, Utc};

use crate::types::Quote;

/// 1.0 while the quote is inside the staleness budget, falling linearly to
/// 0.0 at twice the budget.
pub fn freshness_score(quote: &Quote, now: DateTime<Utc>, staleness_budget_ms: i64) -> f64 {
    let age_ms = (now - quote.timestamp).num_milliseconds();
    if age_ms <= staleness_budget_ms {
        1.0
    } else if staleness_budget_ms <= 0 {
        0.0
    } else {
        (2.0 - age_ms as f64 / staleness_budget_ms as f64).clamp(0.0, 1.0)
    }
}

/// 1.0 while the relative spread is inside `max_spread_ratio`, falling
/// linearly to 0.0 at twice that ratio.
pub fn spread_score(spread_ratio: f64, max_spread_ratio: f64) -> f64 {
    if spread_ratio <= max_spread_ratio {
        1.0
    } else if max_spread_ratio <= 0.0 {
        0.0
    } else {
        (2.0 - spread_ratio / max_spread_ratio).clamp(0.0, 1.0)
    }
}

/// Below-window histories are penalized proportionally.
pub fn sample_score(samples: usize, window: usize) -> f64 {
    if window == 0 {
        return 1.0;
    }
    (samples as f64 / window as f64).clamp(0.0, 1.0)
}

/// Combined score over a set of component quotes.
pub fn component_confidence(
    quotes: &[&Quote],
    now: DateTime<Utc>,
    staleness_budget_ms: i64,
    max_spread_ratio: f64,
    samples: usize,
    window: usize,
) -> f64 {
    let mut score = sample_score(samples, window);
    for quote in quotes {
        score = score
            .min(freshness_score(quote, now, staleness_budget_ms))
            .min(spread_score(quote.spread_ratio(), max_spread_ratio));
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_tight_quote_scores_one() {
        let now = Utc::now();
        let quote = Quote::new("BTC-USD", 30000.0, 30001.0, 1.0, 1.0).with_timestamp(now);
        let score = component_confidence(&[&quote], now, 500, 0.02, 10, 10);
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stale_quote_is_penalized_linearly() {
        let now = Utc::now();
        let quote = Quote::new("BTC-USD", 30000.0, 30001.0, 1.0, 1.0)
            .with_timestamp(now - Duration::milliseconds(750));
        // age = 1.5x budget -> score 0.5
        let score = freshness_score(&quote, now, 500);
        assert!((score - 0.5).abs() < 1e-9);
        let dead = Quote::new("BTC-USD", 30000.0, 30001.0, 1.0, 1.0)
            .with_timestamp(now - Duration::milliseconds(1100));
        assert_eq!(freshness_score(&dead, now, 500), 0.0);
    }

    #[test]
    fn wide_spread_is_penalized() {
        assert!((spread_score(0.01, 0.02) - 1.0).abs() < 1e-12);
        assert!((spread_score(0.03, 0.02) - 0.5).abs() < 1e-9);
        assert_eq!(spread_score(0.05, 0.02), 0.0);
    }

    #[test]
    fn short_history_is_penalized() {
        assert!((sample_score(25, 50) - 0.5).abs() < 1e-12);
        assert_eq!(sample_score(60, 50), 1.0);
    }

    #[test]
    fn combined_score_takes_the_minimum() {
        let now = Utc::now();
        // Tight and fresh, but history only half full.
        let quote = Quote::new("BTC-USD", 30000.0, 30001.0, 1.0, 1.0).with_timestamp(now);
        let score = component_confidence(&[&quote], now, 500, 0.02, 25, 50);
        assert!((score - 0.5).abs() < 1e-9);
    }
}
