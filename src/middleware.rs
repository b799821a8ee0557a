use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info};
use uuid::Uuid;

use crate::handlers::AppState;
use crate::key_generator::{KeyGenerator, UNKNOWN_IDENTITY};
use crate::rate_limiter::{Decision, Quota};
use crate::response::ApiResponse;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        target: "linkgate::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    let status = response.status();
    info!(
        target: "linkgate::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Admission control ahead of the API handlers.
///
/// Store failures reject the request with a 500; they never let it through.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let identity = state.key_generator.identity(&request);

    match state.rate_limiter.admit(&identity).await {
        Ok(decision @ Decision::Admitted(quota)) => {
            state.metrics.record_decision(&decision);
            let mut response = next.run(request).await;
            insert_quota_headers(response.headers_mut(), &quota);
            response
        }
        Ok(decision @ Decision::Throttled(quota)) => {
            state.metrics.record_decision(&decision);
            let mut response = ApiResponse::<()>::message(
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded, try again later",
            )
            .into_response();
            insert_quota_headers(response.headers_mut(), &quota);
            if let Some(secs) = quota.resets_in_secs {
                response
                    .headers_mut()
                    .insert("retry-after", HeaderValue::from(secs));
            }
            response
        }
        Err(err) => {
            state.metrics.record_store_failure();
            error!(identity = %identity, error = %err, "Rate limit check failed");
            err.into_response()
        }
    }
}

fn insert_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(quota.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(quota.remaining));
}

fn get_client_ip(request: &Request) -> String {
    KeyGenerator::forwarded_address(request.headers())
        .or_else(|| KeyGenerator::peer_address(request))
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}
