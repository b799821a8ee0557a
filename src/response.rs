use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// JSON envelope shared by every endpoint, including rejections
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_data(StatusCode::OK, message, data)
    }

    pub fn with_data(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            status_code: status.as_u16(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_empty_data() {
        let body = ApiResponse::<()>::message(StatusCode::TOO_MANY_REQUESTS, "slow down");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["statusCode"], 429);
        assert_eq!(json["message"], "slow down");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_envelope_carries_data() {
        let json = serde_json::to_value(ApiResponse::ok("OK", "Server is healthy")).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["data"], "Server is healthy");
    }
}
