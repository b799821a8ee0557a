pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod health;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod store;

pub use config::Config;
pub use error::{GateError, GateResult};
pub use rate_limiter::{Decision, Quota, RateLimiter};
pub use response::ApiResponse;
pub use server::create_app;
