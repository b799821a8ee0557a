use super::{BoundedIncrement, CounterSnapshot, CounterStore};
use crate::error::{GateError, GateResult};
use crate::rate_limit_config::WindowMode;
use ::redis::aio::ConnectionManager;
use ::redis::{Client, Script};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Compare-and-increment run server side so that no caller can push the
/// count past the limit. Returns {applied, count, pttl}.
const INCREMENT_WITHIN_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return {0, current, redis.call('PTTL', KEYS[1])}
end
if ARGV[3] == 'fixed' then
    redis.call('SET', KEYS[1], 0, 'NX', 'PX', ARGV[2])
    current = redis.call('INCR', KEYS[1])
else
    current = redis.call('INCR', KEYS[1])
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return {1, current, redis.call('PTTL', KEYS[1])}
"#;

/// Counter store backed by a shared Redis instance.
///
/// The connection manager is cheap to clone and reconnects on its own after
/// a dropped connection, so one value is shared by every request.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    increment_within: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> GateResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| GateError::Store(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| GateError::Store(format!("Failed to connect to Redis: {}", e)))?;

        info!(redis = %redacted(redis_url), "Redis connection established");

        Ok(Self {
            connection,
            increment_within: Script::new(INCREMENT_WITHIN_SCRIPT),
        })
    }
}

fn window_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

/// Connection URL without credentials, fit for logs
pub fn redacted(redis_url: &str) -> String {
    match redis_url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
            format!("{}://{}", scheme, host)
        }
        None => "<invalid url>".to_string(),
    }
}

fn mode_arg(mode: WindowMode) -> &'static str {
    match mode {
        WindowMode::Sliding => "sliding",
        WindowMode::Fixed => "fixed",
    }
}

/// PTTL answers -2 for a missing key and -1 for a key without expiry
fn ttl_from_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn read(&self, key: &str) -> GateResult<CounterSnapshot> {
        let mut conn = self.connection.clone();
        let (count, pttl): (Option<u64>, i64) = ::redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| GateError::Store(format!("GET failed: {}", e)))?;

        Ok(CounterSnapshot {
            count: count.unwrap_or(0),
            ttl: ttl_from_pttl(pttl),
        })
    }

    async fn increment(&self, key: &str, window: Duration, mode: WindowMode) -> GateResult<u64> {
        let mut conn = self.connection.clone();
        let millis = window_millis(window);
        let mut pipe = ::redis::pipe();
        pipe.atomic();

        match mode {
            WindowMode::Sliding => {
                pipe.cmd("INCR")
                    .arg(key)
                    .cmd("PEXPIRE")
                    .arg(key)
                    .arg(millis)
                    .ignore();
            }
            WindowMode::Fixed => {
                pipe.cmd("SET")
                    .arg(key)
                    .arg(0)
                    .arg("NX")
                    .arg("PX")
                    .arg(millis)
                    .ignore()
                    .cmd("INCR")
                    .arg(key);
            }
        }

        let (count,): (u64,) = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| GateError::Store(format!("INCR failed: {}", e)))?;
        Ok(count)
    }

    async fn increment_within(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        mode: WindowMode,
    ) -> GateResult<BoundedIncrement> {
        let mut conn = self.connection.clone();
        let (applied, count, pttl): (i64, u64, i64) = self
            .increment_within
            .key(key)
            .arg(limit)
            .arg(window_millis(window))
            .arg(mode_arg(mode))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| GateError::Store(format!("Script execution failed: {}", e)))?;

        let snapshot = CounterSnapshot {
            count,
            ttl: ttl_from_pttl(pttl),
        };
        if applied == 1 {
            Ok(BoundedIncrement::Applied(snapshot))
        } else {
            Ok(BoundedIncrement::Refused(snapshot))
        }
    }

    async fn ping(&self) -> GateResult<()> {
        let mut conn = self.connection.clone();
        let _: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| GateError::Store(format!("Ping failed: {}", e)))?;
        Ok(())
    }
}
