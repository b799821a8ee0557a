//! Shared counter stores
//!
//! The rate limiter keeps one integer counter per identity in a store that
//! every service instance can reach. A store must apply an increment and
//! its expiry as one atomic unit so that a counter never outlives its window.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{redacted, RedisStore};

use crate::error::GateResult;
use crate::rate_limit_config::WindowMode;
use async_trait::async_trait;
use std::time::Duration;

/// Point-in-time view of one counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Increments applied since the counter was created, 0 when absent
    pub count: u64,
    /// Time left before the counter expires, `None` when absent
    pub ttl: Option<Duration>,
}

/// Outcome of a compare-and-increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundedIncrement {
    /// The counter was below the limit and has been incremented
    Applied(CounterSnapshot),
    /// The counter was already at the limit and was left untouched
    Refused(CounterSnapshot),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the current count for `key`, treating a missing key as zero
    async fn read(&self, key: &str) -> GateResult<CounterSnapshot>;

    /// Increment `key` and apply the window expiry in one atomic step.
    /// Returns the post-increment count.
    async fn increment(&self, key: &str, window: Duration, mode: WindowMode) -> GateResult<u64>;

    /// Increment `key` only if its count is below `limit`, atomically.
    async fn increment_within(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        mode: WindowMode,
    ) -> GateResult<BoundedIncrement>;

    /// Round-trip to the store, used by readiness checks
    async fn ping(&self) -> GateResult<()>;
}
