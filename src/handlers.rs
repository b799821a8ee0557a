use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum::extract::Request;
use serde::Serialize;
use std::sync::Arc;

use crate::error::GateError;
use crate::health::HealthChecker;
use crate::key_generator::KeyGenerator;
use crate::metrics::AdmissionMetrics;
use crate::rate_limit_config::RateLimitRule;
use crate::rate_limiter::{Quota, RateLimiter};
use crate::response::ApiResponse;
use crate::store::CounterStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub key_generator: Arc<KeyGenerator>,
    pub metrics: Arc<AdmissionMetrics>,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CounterStore>,
        rule: RateLimitRule,
        key_generator: KeyGenerator,
    ) -> Result<Self, GateError> {
        let health = HealthChecker::new(store.clone(), rule.store_timeout);
        Ok(Self {
            rate_limiter: Arc::new(RateLimiter::new(store, rule)?),
            key_generator: Arc::new(key_generator),
            metrics: Arc::new(AdmissionMetrics::new()),
            health: Arc::new(health),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct QuotaStatus {
    pub identity: String,
    #[serde(flatten)]
    pub quota: Quota,
    pub rule: RateLimitRule,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK", "Server is healthy")
}

/// Quota left to the calling identity
pub async fn quota_status(
    State(state): State<AppState>,
    request: Request,
) -> Result<impl IntoResponse, GateError> {
    let identity = state.key_generator.identity(&request);
    let quota = state.rate_limiter.status(&identity).await?;

    Ok(ApiResponse::ok(
        "Rate limit status",
        QuotaStatus {
            identity,
            quota,
            rule: state.rate_limiter.rule().clone(),
        },
    ))
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.check_health().await;
    let code = if status.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
