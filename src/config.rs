use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;
use validator::Validate;

use crate::config_validator::validate_redis_url;
use crate::key_generator::{KeyGenerator, KeyStrategy};
use crate::rate_limit_config::{Enforcement, RateLimitRule, WindowMode};

/// Where rate limit counters are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Shared Redis instance, required when running more than one replica
    Redis,
    /// Process-local counters
    Memory,
}

#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "linkgate", version, about = "URL shortener API gateway with distributed rate limiting")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Counter store backend
    #[arg(long, env = "STORE", value_enum, default_value_t = StoreBackend::Redis)]
    pub store: StoreBackend,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    #[validate(custom(function = "validate_redis_url"))]
    pub redis_url: String,

    /// Requests allowed per identity per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 50)]
    #[validate(range(min = 1))]
    pub rate_limit: u64,

    /// Window length, e.g. `24h` or `90s`
    #[arg(long = "window", env = "RATE_LIMIT_WINDOW", default_value = "24h", value_parser = humantime::parse_duration)]
    pub window: Duration,

    /// Upper bound on the store round trips of one admission check
    #[arg(long, env = "STORE_TIMEOUT", default_value = "500ms", value_parser = humantime::parse_duration)]
    pub store_timeout: Duration,

    #[arg(long, env = "WINDOW_MODE", value_enum, default_value_t = WindowMode::Sliding)]
    pub window_mode: WindowMode,

    #[arg(long, env = "ENFORCEMENT", value_enum, default_value_t = Enforcement::BestEffort)]
    pub enforcement: Enforcement,

    /// How callers are told apart
    #[arg(long, env = "IDENTITY_SOURCE", value_enum, default_value_t = KeyStrategy::PeerAddress)]
    pub identity_source: KeyStrategy,

    /// Comma-separated API keys that get their own counter with `--identity-source api-key`
    #[arg(long, env = "API_KEYS", value_delimiter = ',')]
    pub api_keys: Vec<String>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn rate_limit_rule(&self) -> RateLimitRule {
        RateLimitRule::new(self.rate_limit, self.window)
            .with_window_mode(self.window_mode)
            .with_enforcement(self.enforcement)
            .with_store_timeout(self.store_timeout)
    }

    pub fn key_generator(&self) -> KeyGenerator {
        KeyGenerator::new(self.identity_source)
            .with_api_keys(self.api_keys.iter().map(|key| key.trim().to_string()))
    }
}
