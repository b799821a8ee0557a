//! Client identity extraction for rate limiting.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use clap::ValueEnum;
use std::collections::HashSet;
use std::net::SocketAddr;

/// Prefix shared by every counter key in the store
pub const COUNTER_KEY_PREFIX: &str = "rate_limit:";

/// Identity used when no strategy yields anything
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Strategy for deriving a caller's identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum KeyStrategy {
    /// Address of the TCP peer
    #[default]
    PeerAddress,
    /// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the peer.
    /// Only safe behind a proxy that overwrites these headers.
    ForwardedFor,
    /// `X-API-Key` header when it names a configured key, otherwise the peer.
    /// Unrecognised keys share the peer's counter, so rotating them gains nothing.
    ApiKey,
}

/// Counter key for an identity
pub fn counter_key(identity: &str) -> String {
    format!("{}{}", COUNTER_KEY_PREFIX, identity)
}

/// Derives rate limit identities from requests
#[derive(Debug, Clone, Default)]
pub struct KeyGenerator {
    strategy: KeyStrategy,
    api_keys: HashSet<String>,
}

impl KeyGenerator {
    pub fn new(strategy: KeyStrategy) -> Self {
        Self {
            strategy,
            api_keys: HashSet::new(),
        }
    }

    /// Keys that earn their own counter under `KeyStrategy::ApiKey`
    pub fn with_api_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_keys = keys
            .into_iter()
            .map(Into::into)
            .filter(|key: &String| !key.is_empty())
            .collect();
        self
    }

    /// Identity for a request; never empty
    pub fn identity<B>(&self, request: &Request<B>) -> String {
        let headers = request.headers();
        let identity = match self.strategy {
            KeyStrategy::PeerAddress => Self::peer_address(request),
            KeyStrategy::ForwardedFor => {
                Self::forwarded_address(headers).or_else(|| Self::peer_address(request))
            }
            KeyStrategy::ApiKey => Self::api_key(headers)
                .filter(|key| self.api_keys.contains(key))
                .map(|key| format!("api_key:{}", key))
                .or_else(|| Self::peer_address(request)),
        };

        identity.unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
    }

    /// IP of the connected peer, as recorded by `into_make_service_with_connect_info`
    pub fn peer_address<B>(request: &Request<B>) -> Option<String> {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    }

    /// Client address announced by a fronting proxy
    pub fn forwarded_address(headers: &HeaderMap) -> Option<String> {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        forwarded
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|value| value.to_str().ok())
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
            })
            .map(str::to_string)
    }

    fn api_key(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}
