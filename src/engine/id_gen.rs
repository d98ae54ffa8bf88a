//! Opportunity id generation

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use rand::Rng;

/// Injectable id source so tests stay deterministic.
pub trait OpportunityIdGenerator: Send {
    /// `prefix` is "ARB" for general opportunities, "TRIANG" for the
    /// triangular specialization.
    fn next_id(&self, prefix: &str) -> String;
}

/// Production generator: `<prefix>_<epoch_ms>_<4-digit-random>`. Suffixes
/// already issued within the current millisecond are redrawn, keeping ids
/// unique across the process run.
pub struct RandomIdGenerator {
    issued: Mutex<(i64, HashSet<u32>)>,
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self {
            issued: Mutex::new((0, HashSet::new())),
        }
    }
}

impl OpportunityIdGenerator for RandomIdGenerator {
    fn next_id(&self, prefix: &str) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let mut issued = self.issued.lock().unwrap();
        if issued.0 != timestamp {
            *issued = (timestamp, HashSet::new());
        }

        let mut rng = rand::thread_rng();
        let mut suffix: u32 = rng.gen_range(1000..10000);
        while !issued.1.insert(suffix) {
            if issued.1.len() >= 9000 {
                // Millisecond exhausted; roll the counter space forward.
                issued.1.clear();
            }
            suffix = rng.gen_range(1000..10000);
        }
        format!("{prefix}_{timestamp}_{suffix}")
    }
}

/// Deterministic generator for tests.
#[derive(Default)]
pub struct SequentialIdGenerator {
    counter: AtomicU64,
}

impl OpportunityIdGenerator for SequentialIdGenerator {
    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}_{n}")
    }
}
