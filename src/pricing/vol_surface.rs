//! Implied volatility surface with bilinear interpolation

use std::collections::HashMap;

use crate::config::DEFAULT_VOLATILITY;

/// Mapping from (strike, time_to_expiry) to implied volatility.
/// Interpolation is exact at stored points; queries between stored points
/// are bilinear over the bracketing grid cell; when the bracketing corners
/// are incomplete the query falls back to the ATM level for that expiry
/// (mean of the nearest expiry row), then to the 20% default.
#[derive(Debug, Clone, Default)]
pub struct VolatilitySurface {
    strikes: Vec<f64>,
    expiries: Vec<f64>,
    points: HashMap<(u64, u64), f64>,
}

fn key(strike: f64, expiry: f64) -> (u64, u64) {
    (strike.to_bits(), expiry.to_bits())
}

fn insert_sorted(axis: &mut Vec<f64>, value: f64) {
    match axis.binary_search_by(|v| v.partial_cmp(&value).unwrap()) {
        Ok(_) => {}
        Err(pos) => axis.insert(pos, value),
    }
}

/// Bracketing neighbors on a sorted axis; values outside the range clamp
/// to the nearest endpoint.
fn neighbors(axis: &[f64], value: f64) -> Option<(f64, f64)> {
    let (first, last) = (*axis.first()?, *axis.last()?);
    if value <= first {
        return Some((first, first));
    }
    if value >= last {
        return Some((last, last));
    }
    let idx = axis.partition_point(|v| *v <= value);
    Some((axis[idx - 1], axis[idx]))
}

impl VolatilitySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_point(&mut self, strike: f64, time_to_expiry: f64, volatility: f64) {
        if volatility <= 0.0 {
            return;
        }
        insert_sorted(&mut self.strikes, strike);
        insert_sorted(&mut self.expiries, time_to_expiry);
        self.points.insert(key(strike, time_to_expiry), volatility);
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn interpolate_volatility(&self, strike: f64, time_to_expiry: f64) -> f64 {
        if let Some(vol) = self.points.get(&key(strike, time_to_expiry)) {
            return *vol;
        }

        let (Some((s_lo, s_hi)), Some((t_lo, t_hi))) = (
            neighbors(&self.strikes, strike),
            neighbors(&self.expiries, time_to_expiry),
        ) else {
            return DEFAULT_VOLATILITY;
        };

        let corners = [
            self.points.get(&key(s_lo, t_lo)),
            self.points.get(&key(s_hi, t_lo)),
            self.points.get(&key(s_lo, t_hi)),
            self.points.get(&key(s_hi, t_hi)),
        ];

        match corners {
            [Some(v00), Some(v10), Some(v01), Some(v11)] => {
                let wx = if s_hi > s_lo {
                    (strike.clamp(s_lo, s_hi) - s_lo) / (s_hi - s_lo)
                } else {
                    0.0
                };
                let wt = if t_hi > t_lo {
                    (time_to_expiry.clamp(t_lo, t_hi) - t_lo) / (t_hi - t_lo)
                } else {
                    0.0
                };
                let low = v00 * (1.0 - wx) + v10 * wx;
                let high = v01 * (1.0 - wx) + v11 * wx;
                low * (1.0 - wt) + high * wt
            }
            _ => self.atm_fallback(time_to_expiry),
        }
    }

    pub fn get_atm_volatility(&self, spot_price: f64, time_to_expiry: f64) -> f64 {
        self.interpolate_volatility(spot_price, time_to_expiry)
    }

    /// Mean of the stored vols at the expiry nearest to `time_to_expiry`.
    fn atm_fallback(&self, time_to_expiry: f64) -> f64 {
        let Some(nearest) = self
            .expiries
            .iter()
            .copied()
            .min_by(|a, b| {
                (a - time_to_expiry)
                    .abs()
                    .partial_cmp(&(b - time_to_expiry).abs())
                    .unwrap()
            })
        else {
            return DEFAULT_VOLATILITY;
        };

        let row: Vec<f64> = self
            .strikes
            .iter()
            .filter_map(|s| self.points.get(&key(*s, nearest)).copied())
            .collect();

        if row.is_empty() {
            DEFAULT_VOLATILITY
        } else {
            row.iter().sum::<f64>() / row.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> VolatilitySurface {
        let mut surface = VolatilitySurface::new();
        surface.update_point(40_000.0, 0.1, 0.60);
        surface.update_point(50_000.0, 0.1, 0.50);
        surface.update_point(40_000.0, 0.5, 0.55);
        surface.update_point(50_000.0, 0.5, 0.45);
        surface
    }

    #[test]
    fn exact_at_stored_points() {
        let surface = grid();
        assert_eq!(surface.interpolate_volatility(40_000.0, 0.1), 0.60);
        assert_eq!(surface.interpolate_volatility(50_000.0, 0.5), 0.45);
    }

    #[test]
    fn interpolation_is_idempotent_at_stored_points() {
        let surface = grid();
        for &(s, t) in &[(40_000.0, 0.1), (50_000.0, 0.1), (40_000.0, 0.5), (50_000.0, 0.5)] {
            let once = surface.interpolate_volatility(s, t);
            let twice = surface.interpolate_volatility(s, t);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn bilinear_at_cell_center() {
        let surface = grid();
        let vol = surface.interpolate_volatility(45_000.0, 0.3);
        let expected = (0.60 + 0.50 + 0.55 + 0.45) / 4.0;
        assert!((vol - expected).abs() < 1e-12);
    }

    #[test]
    fn linear_along_one_axis() {
        let surface = grid();
        let vol = surface.interpolate_volatility(45_000.0, 0.1);
        assert!((vol - 0.55).abs() < 1e-12);
    }

    #[test]
    fn clamps_outside_the_grid() {
        let surface = grid();
        assert_eq!(surface.interpolate_volatility(30_000.0, 0.1), 0.60);
        assert_eq!(surface.interpolate_volatility(60_000.0, 0.5), 0.45);
    }

    #[test]
    fn empty_surface_returns_default() {
        let surface = VolatilitySurface::new();
        assert_eq!(surface.interpolate_volatility(50_000.0, 0.25), DEFAULT_VOLATILITY);
    }

    #[test]
    fn missing_corner_falls_back_to_atm_row() {
        let mut surface = VolatilitySurface::new();
        surface.update_point(40_000.0, 0.1, 0.60);
        surface.update_point(50_000.0, 0.1, 0.50);
        surface.update_point(40_000.0, 0.5, 0.55);
        // (50_000, 0.5) missing: interior queries fall back to the
        // nearest-expiry row mean.
        let vol = surface.interpolate_volatility(45_000.0, 0.45);
        assert!((vol - 0.55).abs() < 1e-12);
    }

    #[test]
    fn non_positive_vols_are_rejected() {
        let mut surface = VolatilitySurface::new();
        surface.update_point(50_000.0, 0.25, -0.3);
        assert!(surface.is_empty());
    }
}
