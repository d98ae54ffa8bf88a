//! Shared detector contract, callbacks, and active-opportunity tracking

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::types::{DetectionParameters, MarketSnapshot, MispricingOpportunity};

pub type DetectionCallback = Arc<dyn Fn(&MispricingOpportunity) + Send + Sync>;
pub type ExpiryCallback = Arc<dyn Fn(&MispricingOpportunity) + Send + Sync>;

/// Contract shared by all mispricing detectors. Detection is pull-based:
/// `update_market_data` ingests a snapshot, `detect_opportunities` is
/// polled each tick.
pub trait MispricingDetector: Send {
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>);
    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity>;
    fn update_parameters(&mut self, params: DetectionParameters);
    fn set_detection_callback(&mut self, callback: DetectionCallback);
    fn set_expiry_callback(&mut self, callback: ExpiryCallback);
}

/// Per-detector list of live opportunities. Expired entries are removed on
/// every sweep and the expiry callback fires exactly once per entry.
#[derive(Default)]
pub struct ActiveOpportunities {
    inner: Mutex<Vec<MispricingOpportunity>>,
}

impl ActiveOpportunities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, opportunity: MispricingOpportunity) {
        self.inner.lock().unwrap().push(opportunity);
    }

    /// Defensive copy for iteration.
    pub fn snapshot(&self) -> Vec<MispricingOpportunity> {
        self.inner.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn sweep_expired(&self, now: DateTime<Utc>, expiry_callback: Option<&ExpiryCallback>) {
        let expired: Vec<MispricingOpportunity> = {
            let mut guard = self.inner.lock().unwrap();
            let (expired, live): (Vec<_>, Vec<_>) =
                guard.drain(..).partition(|opp| opp.is_expired(now));
            *guard = live;
            expired
        };
        if let Some(callback) = expiry_callback {
            for opportunity in &expired {
                callback(opportunity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MispricingType;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn opportunity(expires_in_ms: i64) -> MispricingOpportunity {
        MispricingOpportunity::new(
            "BTC-USD",
            MispricingType::StatisticalArbitrage,
            30_100.0,
            30_000.0,
            Duration::milliseconds(expires_in_ms),
        )
    }

    #[test]
    fn expiry_callback_fires_exactly_once() {
        let active = ActiveOpportunities::new();
        active.push(opportunity(-1));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let callback: ExpiryCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        active.sweep_expired(Utc::now(), Some(&callback));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(active.is_empty());

        // A second sweep must not refire.
        active.sweep_expired(Utc::now(), Some(&callback));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn live_opportunities_survive_the_sweep() {
        let active = ActiveOpportunities::new();
        active.push(opportunity(60_000));
        active.push(opportunity(-1));

        active.sweep_expired(Utc::now(), None);
        assert_eq!(active.len(), 1);
    }
}
