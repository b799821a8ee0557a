use crate::config::{Config, StoreBackend};
use crate::config_validator::ConfigValidator;
use crate::error::GateResult;
use crate::handlers::{health_check, metrics, quota_status, readiness_check, AppState};
use crate::middleware::{logging_middleware, rate_limit_middleware};
use crate::store::{CounterStore, MemoryStore, RedisStore};
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the router. Everything under `/api/v1` passes the rate limiter first;
/// probes and metrics do not, so they keep answering for throttled callers.
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/rate-limit", get(quota_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .nest("/api/v1", api)
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub async fn connect_store(config: &Config) -> GateResult<Arc<dyn CounterStore>> {
    match config.store {
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(&config.redis_url).await?)),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory counters; limits are not shared between instances");
            let store = MemoryStore::new();
            spawn_purge_task(store.clone(), config.window);
            Ok(Arc::new(store))
        }
    }
}

/// Expired counters are otherwise only reset when their identity returns
fn spawn_purge_task(store: MemoryStore, window: Duration) {
    let period = window.clamp(Duration::from_secs(1), Duration::from_secs(300));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match store.purge_expired() {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired counters"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired counters"),
            }
        }
    });
}

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> GateResult<Self> {
        ConfigValidator::validate(&config)?;
        Ok(Self { config })
    }

    pub async fn run(self) -> GateResult<()> {
        let store = connect_store(&self.config).await?;
        let rule = self.config.rate_limit_rule();
        tracing::info!(
            limit = rule.limit,
            window = ?rule.window,
            window_mode = ?rule.window_mode,
            enforcement = ?rule.enforcement,
            "Rate limiter configured"
        );

        let state = AppState::new(
            store,
            rule,
            self.config.key_generator(),
        )?;
        let app = create_app(state);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("linkgate listening on {}", self.config.bind_addr);
        tracing::info!("Readiness check available at /ready");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
