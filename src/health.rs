use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::store::CounterStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
}

impl HealthStatus {
    pub fn is_ready(&self) -> bool {
        self.dependencies.counter_store.status == "healthy"
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub counter_store: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

/// Readiness probe for the counter store.
///
/// The limiter fails closed, so an unreachable store means the service
/// rejects all API traffic and should be pulled from rotation.
pub struct HealthChecker {
    store: Arc<dyn CounterStore>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn CounterStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        let store_status = self.check_store().await;
        let overall_status = if store_status.status == "healthy" {
            "healthy"
        } else {
            "unhealthy"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus {
                counter_store: store_status,
            },
        }
    }

    async fn check_store(&self) -> ServiceStatus {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.store.ping()).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!("No response within {:?}", self.timeout)),
        };

        ServiceStatus {
            status: if error.is_none() { "healthy" } else { "unavailable" }.to_string(),
            response_time_ms,
            error,
        }
    }
}
