//! Black-Scholes pricing, analytic Greeks, and implied volatility

use std::f64::consts::PI;

use serde::Serialize;

pub const MIN_VOL: f64 = 0.01;
pub const MAX_VOL: f64 = 5.0;
pub const IMPLIED_VOL_TOLERANCE: f64 = 1e-6;
pub const IMPLIED_VOL_MAX_ITERATIONS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct BsInputs {
    pub spot: f64,
    pub strike: f64,
    pub time: f64,
    pub vol: f64,
    pub rate: f64,
    pub is_call: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

pub fn norm_pdf(x: f64) -> f64 {
    (1.0 / (2.0 * PI).sqrt()) * (-0.5 * x * x).exp()
}

/// Abramowitz-Stegun polynomial approximation of the standard normal CDF.
pub fn norm_cdf(x: f64) -> f64 {
    let k = 1.0 / (1.0 + 0.2316419 * x.abs());
    let poly = k
        * (0.319381530
            + k * (-0.356563782 + k * (1.781477937 + k * (-1.821255978 + k * 1.330274429))));

    let approx = 1.0 - norm_pdf(x) * poly;

    if x >= 0.0 {
        approx
    } else {
        1.0 - approx
    }
}

pub fn d1_d2(input: &BsInputs) -> (f64, f64) {
    let t = input.time.max(1e-9);
    let v = input.vol.max(1e-9);

    let d1 = ((input.spot / input.strike).ln() + (input.rate + 0.5 * v * v) * t) / (v * t.sqrt());
    let d2 = d1 - v * t.sqrt();

    (d1, d2)
}

pub fn price(input: &BsInputs) -> f64 {
    let (d1, d2) = d1_d2(input);
    let discount = (-input.rate * input.time).exp();

    let price = if input.is_call {
        input.spot * norm_cdf(d1) - input.strike * discount * norm_cdf(d2)
    } else {
        input.strike * discount * norm_cdf(-d2) - input.spot * norm_cdf(-d1)
    };

    price.max(0.0)
}

pub fn greeks(input: &BsInputs) -> Greeks {
    let (d1, d2) = d1_d2(input);
    let t = input.time.max(1e-9);
    let v = input.vol.max(1e-9);
    let sqrt_t = t.sqrt();
    let pdf = norm_pdf(d1);
    let discount = (-input.rate * t).exp();

    let delta = if input.is_call {
        norm_cdf(d1)
    } else {
        norm_cdf(d1) - 1.0
    };

    let gamma = pdf / (input.spot * v * sqrt_t);
    let vega = input.spot * pdf * sqrt_t;

    let theta = if input.is_call {
        -(input.spot * pdf * v) / (2.0 * sqrt_t)
            - input.rate * input.strike * discount * norm_cdf(d2)
    } else {
        -(input.spot * pdf * v) / (2.0 * sqrt_t)
            + input.rate * input.strike * discount * norm_cdf(-d2)
    };

    let rho = if input.is_call {
        input.strike * t * discount * norm_cdf(d2)
    } else {
        -input.strike * t * discount * norm_cdf(-d2)
    };

    Greeks {
        delta,
        gamma,
        theta,
        vega,
        rho,
    }
}

pub fn intrinsic_value(spot: f64, strike: f64, is_call: bool) -> f64 {
    if is_call {
        (spot - strike).max(0.0)
    } else {
        (strike - spot).max(0.0)
    }
}

/// Implied volatility by bisection on [MIN_VOL, MAX_VOL]. Price is
/// monotone in volatility, so the bracket either contains the root or the
/// market price is outside the model's range and None is returned.
pub fn implied_volatility(market_price: f64, input: &BsInputs) -> Option<f64> {
    let mut lo = MIN_VOL;
    let mut hi = MAX_VOL;

    let price_at = |vol: f64| {
        price(&BsInputs {
            vol,
            ..*input
        })
    };

    if market_price < price_at(lo) || market_price > price_at(hi) {
        return None;
    }

    for _ in 0..IMPLIED_VOL_MAX_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let diff = price_at(mid) - market_price;

        if diff.abs() < IMPLIED_VOL_TOLERANCE {
            return Some(mid);
        }

        if diff > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Some(0.5 * (lo + hi))
}
