//! Statistical helpers shared by pricing models and detectors

/// Trading-day annualization factor for realized volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (n - 1 denominator).
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn sample_std_dev(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Z-score of `current` against the sample distribution of `history`.
/// Returns 0.0 when the history is degenerate.
pub fn z_score(history: &[f64], current: f64) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let std_dev = sample_std_dev(history);
    if std_dev > 0.0 {
        (current - mean(history)) / std_dev
    } else {
        0.0
    }
}

/// Pearson correlation over paired samples, clamped to [-1, 1].
/// Returns 0.0 when either series is degenerate.
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let xs = &xs[..n];
    let ys = &ys[..n];
    let mx = mean(xs);
    let my = mean(ys);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mx;
        let dy = ys[i] - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x > 0.0 && var_y > 0.0 {
        (cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Log-returns of a price series; non-positive prices are skipped.
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

/// Annualized volatility of a price series using the sqrt(252) convention.
pub fn annualized_volatility(prices: &[f64]) -> f64 {
    let returns = log_returns(prices);
    if returns.len() < 2 {
        return 0.0;
    }
    sample_std_dev(&returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Peak-to-trough maximum drawdown of a cumulative P&L series.
pub fn max_drawdown(pnl_series: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &pnl in pnl_series {
        peak = peak.max(pnl);
        worst = worst.max(peak - pnl);
    }
    worst
}
