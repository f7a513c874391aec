use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Failure half of the uniform response envelope. `success` is always
/// `false` here; the success half lives in [`crate::routes::ApiEnvelope`].
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
    pub retry_after_seconds: Option<u64>,
    /// Raw cause, only serialized when the server runs in development mode.
    pub details: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: Some("INVALID_INPUT"),
            retry_after_seconds: None,
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            code: Some("NOT_FOUND"),
            retry_after_seconds: None,
            details: None,
        }
    }

    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Rate limit exceeded. Please wait before making another request.".to_string(),
            code: Some("RATE_LIMITED"),
            retry_after_seconds: Some(retry_after_seconds),
            details: None,
        }
    }

    /// The upstream service could not be reached, timed out, or answered
    /// with a non-2xx status or an unparseable body.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: Some("UPSTREAM_ERROR"),
            retry_after_seconds: None,
            details: None,
        }
    }

    /// The upstream service was reachable but reported its own failure code.
    pub fn upstream_rejected(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: Some("UPSTREAM_REJECTED"),
            retry_after_seconds: None,
            details: None,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
            code: Some("ACCESS_DENIED"),
            retry_after_seconds: None,
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: Some("INTERNAL"),
            retry_after_seconds: None,
            details: None,
        }
    }

    /// Attach the raw cause. Serialized only when `development` is true at
    /// response time, so handlers can attach it unconditionally.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Pass-through of an upstream HTTP status for the file proxy route.
    pub fn passthrough(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: Some("UPSTREAM_ERROR"),
            retry_after_seconds: None,
            details: None,
        }
    }

    pub fn into_response_for(self, development: bool) -> Response {
        let body = Json(ErrorBody {
            success: false,
            error: self.message,
            code: self.code,
            details: if development { self.details } else { None },
        });

        let mut response = (self.status, body).into_response();
        if let Some(seconds) = self.retry_after_seconds
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Handlers that know the environment call `into_response_for`; the
        // blanket impl stays conservative and never leaks details.
        self.into_response_for(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_carries_retry_after_header() {
        let response = ApiError::rate_limited(42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).map(|v| v.to_str().unwrap()),
            Some("42")
        );
    }

    async fn body_value(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should collect");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[tokio::test]
    async fn details_only_appear_in_development() {
        let error = ApiError::upstream("boom").with_details("socket reset");
        let body = body_value(error.into_response_for(false)).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "boom");
        assert!(body.get("details").is_none());

        let error = ApiError::upstream("boom").with_details("socket reset");
        let body = body_value(error.into_response_for(true)).await;
        assert_eq!(body["details"], "socket reset");
    }

    #[test]
    fn envelope_failures_carry_a_stable_code() {
        assert_eq!(ApiError::bad_request("x").code, Some("INVALID_INPUT"));
        assert_eq!(ApiError::not_found("x").code, Some("NOT_FOUND"));
        assert_eq!(ApiError::rate_limited(1).code, Some("RATE_LIMITED"));
        assert_eq!(ApiError::upstream("x").code, Some("UPSTREAM_ERROR"));
        assert_eq!(ApiError::upstream_rejected("x").code, Some("UPSTREAM_REJECTED"));
    }
}
