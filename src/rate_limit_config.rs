use clap::ValueEnum;
use serde::Serialize;
use std::time::Duration;

use crate::error::{GateError, GateResult};

/// Longest accepted window
pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// How the counter TTL is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// TTL is refreshed on every admitted increment, so an active caller's window never lapses
    Sliding,
    /// TTL is set once when the counter is created
    Fixed,
}

/// How the limit is enforced at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Read then increment; concurrent callers may overshoot the limit slightly
    BestEffort,
    /// Single atomic compare-and-increment in the store
    Strict,
}

/// Process-wide rate limiting rule, fixed at startup
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitRule {
    pub limit: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub window_mode: WindowMode,
    pub enforcement: Enforcement,
    #[serde(skip)]
    pub store_timeout: Duration,
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            limit: 50,
            window: Duration::from_secs(24 * 60 * 60),
            window_mode: WindowMode::Sliding,
            enforcement: Enforcement::BestEffort,
            store_timeout: Duration::from_millis(500),
        }
    }
}

impl RateLimitRule {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            ..Self::default()
        }
    }

    pub fn with_window_mode(mut self, mode: WindowMode) -> Self {
        self.window_mode = mode;
        self
    }

    pub fn with_enforcement(mut self, enforcement: Enforcement) -> Self {
        self.enforcement = enforcement;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Validate rule parameters
    pub fn validate(&self) -> GateResult<()> {
        if self.limit == 0 {
            return Err(GateError::Validation(
                "Rate limit must be greater than 0".to_string(),
            ));
        }
        // Redis expiries are whole milliseconds.
        if self.window.as_millis() == 0 {
            return Err(GateError::Validation(
                "Window must be at least one millisecond".to_string(),
            ));
        }
        if self.window > MAX_WINDOW {
            return Err(GateError::Validation(format!(
                "Window must not exceed {}",
                humantime::format_duration(MAX_WINDOW)
            )));
        }
        if self.store_timeout.is_zero() {
            return Err(GateError::Validation(
                "Store timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
