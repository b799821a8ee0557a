use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

use crate::config::{Config, StoreBackend};
use crate::error::{GateError, GateResult};
use crate::key_generator::KeyStrategy;

static REDIS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^rediss?://[^\s]+$").expect("redis url pattern is valid"));

/// Validates a Redis URL
pub fn validate_redis_url(url: &str) -> Result<(), ValidationError> {
    if REDIS_URL.is_match(url) {
        Ok(())
    } else {
        Err(ValidationError::new("redis_url").with_message(Cow::Borrowed(
            "Redis URL must start with 'redis://' or 'rediss://'",
        )))
    }
}

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> GateResult<()> {
        if let Err(errors) = config.validate() {
            // The Redis URL is irrelevant when counters stay in memory.
            let only_redis_url = errors.field_errors().keys().all(|field| *field == "redis_url");
            if !(config.store == StoreBackend::Memory && only_redis_url) {
                return Err(GateError::Configuration(errors.to_string()));
            }
        }

        if config.identity_source == KeyStrategy::ApiKey
            && config.api_keys.iter().all(|key| key.trim().is_empty())
        {
            return Err(GateError::Configuration(
                "--identity-source api-key requires at least one key in --api-keys".to_string(),
            ));
        }

        config
            .rate_limit_rule()
            .validate()
            .map_err(|e| GateError::Configuration(e.to_string()))
    }
}
