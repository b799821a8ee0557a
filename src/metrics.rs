use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::rate_limiter::Decision;

/// Totals reported by `/metrics`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionSnapshot {
    pub total_requests: u64,
    pub admitted_requests: u64,
    pub throttled_requests: u64,
    pub store_failures: u64,
    pub started_at: u64,
}

/// Process-local admission counters. Each instance reports only its own traffic.
#[derive(Debug)]
pub struct AdmissionMetrics {
    admitted: AtomicU64,
    throttled: AtomicU64,
    store_failures: AtomicU64,
    started_at: u64,
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self {
            admitted: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            started_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

impl AdmissionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, decision: &Decision) {
        let counter = if decision.is_admitted() {
            &self.admitted
        } else {
            &self.throttled
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AdmissionSnapshot {
        let admitted = self.admitted.load(Ordering::Relaxed);
        let throttled = self.throttled.load(Ordering::Relaxed);
        let store_failures = self.store_failures.load(Ordering::Relaxed);

        AdmissionSnapshot {
            total_requests: admitted + throttled + store_failures,
            admitted_requests: admitted,
            throttled_requests: throttled,
            store_failures,
            started_at: self.started_at,
        }
    }
}
