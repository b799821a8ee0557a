use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{GateError, GateResult};
use crate::key_generator::counter_key;
use crate::rate_limit_config::{Enforcement, RateLimitRule, WindowMode};
use crate::store::{BoundedIncrement, CounterSnapshot, CounterStore};

/// Quota left to one identity after a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quota {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
    /// Seconds until the counter lapses, rounded up
    pub resets_in_secs: Option<u64>,
}

impl Quota {
    fn new(limit: u64, used: u64, ttl: Option<Duration>) -> Self {
        Self {
            limit,
            used,
            remaining: limit.saturating_sub(used),
            resets_in_secs: ttl.map(|ttl| ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)),
        }
    }
}

/// Admission decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted(Quota),
    Throttled(Quota),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted(_))
    }

    pub fn quota(&self) -> &Quota {
        match self {
            Decision::Admitted(quota) | Decision::Throttled(quota) => quota,
        }
    }
}

/// Admission controller backed by a shared counter store.
///
/// Store failures are returned as errors rather than decisions; callers must
/// reject the request in that case.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    rule: RateLimitRule,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, rule: RateLimitRule) -> GateResult<Self> {
        rule.validate()?;
        Ok(Self { store, rule })
    }

    pub fn rule(&self) -> &RateLimitRule {
        &self.rule
    }

    /// Decide whether `identity` may make another request
    pub async fn admit(&self, identity: &str) -> GateResult<Decision> {
        if identity.is_empty() {
            return Err(GateError::Validation(
                "Client identity cannot be empty".to_string(),
            ));
        }

        let key = counter_key(identity);
        let decision = self.bounded(self.decide(&key)).await?;

        if let Decision::Throttled(quota) = &decision {
            debug!(identity = %identity, used = quota.used, "Rate limit exceeded");
        }
        Ok(decision)
    }

    /// Current usage for `identity` without consuming quota
    pub async fn status(&self, identity: &str) -> GateResult<Quota> {
        let key = counter_key(identity);
        let snapshot = self.bounded(self.store.read(&key)).await?;
        Ok(Quota::new(self.rule.limit, snapshot.count, snapshot.ttl))
    }

    async fn decide(&self, key: &str) -> GateResult<Decision> {
        match self.rule.enforcement {
            Enforcement::BestEffort => self.check_then_increment(key).await,
            Enforcement::Strict => self.increment_within_limit(key).await,
        }
    }

    /// Read, compare, then increment. Concurrent callers can both pass the
    /// comparison, so the count may end slightly above the limit.
    async fn check_then_increment(&self, key: &str) -> GateResult<Decision> {
        let snapshot = self.store.read(key).await?;
        if snapshot.count >= self.rule.limit {
            return Ok(Decision::Throttled(self.quota(snapshot)));
        }

        let count = self
            .store
            .increment(key, self.rule.window, self.rule.window_mode)
            .await?;

        let ttl = match self.rule.window_mode {
            WindowMode::Sliding => Some(self.rule.window),
            WindowMode::Fixed => snapshot.ttl.or(Some(self.rule.window)),
        };
        Ok(Decision::Admitted(Quota::new(self.rule.limit, count, ttl)))
    }

    async fn increment_within_limit(&self, key: &str) -> GateResult<Decision> {
        let outcome = self
            .store
            .increment_within(
                key,
                self.rule.limit,
                self.rule.window,
                self.rule.window_mode,
            )
            .await?;

        Ok(match outcome {
            BoundedIncrement::Applied(snapshot) => Decision::Admitted(self.quota(snapshot)),
            BoundedIncrement::Refused(snapshot) => Decision::Throttled(self.quota(snapshot)),
        })
    }

    fn quota(&self, snapshot: CounterSnapshot) -> Quota {
        Quota::new(self.rule.limit, snapshot.count, snapshot.ttl)
    }

    async fn bounded<T>(
        &self,
        operation: impl std::future::Future<Output = GateResult<T>>,
    ) -> GateResult<T> {
        let timeout = self.rule.store_timeout;
        tokio::time::timeout(timeout, operation)
            .await
            .map_err(|_| GateError::StoreTimeout(timeout))?
    }
}
