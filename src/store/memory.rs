use super::{BoundedIncrement, CounterSnapshot, CounterStore};
use crate::error::{GateError, GateResult};
use crate::rate_limit_config::WindowMode;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Process-local counter store.
///
/// Counters live only in this process, so several instances behind a load
/// balancer each enforce their own limit. Useful for development and as a
/// test double; it follows tokio's clock so paused-time tests can expire keys.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

#[derive(Debug, Clone)]
struct Entry {
    count: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn snapshot(&self, now: Instant) -> CounterSnapshot {
        CounterSnapshot {
            count: self.count,
            ttl: self.expires_at.map(|at| at.saturating_duration_since(now)),
        }
    }

    fn bump(&mut self, now: Instant, window: Duration, mode: WindowMode) {
        let fresh = self.count == 0;
        self.count += 1;
        if fresh || mode == WindowMode::Sliding {
            self.expires_at = Some(now + window);
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop counters whose window has lapsed, returning how many were removed
    pub fn purge_expired(&self) -> GateResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| {
            GateError::Internal("Failed to acquire write lock on counters".to_string())
        })?;

        let initial_count = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(initial_count - entries.len())
    }

    /// Number of counters held, including ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_live_entry<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Entry, Instant) -> T,
    ) -> GateResult<T> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| {
            GateError::Internal("Failed to acquire write lock on counters".to_string())
        })?;

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.count = 0;
            entry.expires_at = None;
        }
        Ok(f(entry, now))
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn read(&self, key: &str) -> GateResult<CounterSnapshot> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(|_| {
            GateError::Internal("Failed to acquire read lock on counters".to_string())
        })?;

        Ok(match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => entry.snapshot(now),
            _ => CounterSnapshot::default(),
        })
    }

    async fn increment(&self, key: &str, window: Duration, mode: WindowMode) -> GateResult<u64> {
        self.with_live_entry(key, |entry, now| {
            entry.bump(now, window, mode);
            entry.count
        })
    }

    async fn increment_within(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        mode: WindowMode,
    ) -> GateResult<BoundedIncrement> {
        self.with_live_entry(key, |entry, now| {
            if entry.count >= limit {
                BoundedIncrement::Refused(entry.snapshot(now))
            } else {
                entry.bump(now, window, mode);
                BoundedIncrement::Applied(entry.snapshot(now))
            }
        })
    }

    async fn ping(&self) -> GateResult<()> {
        Ok(())
    }
}
