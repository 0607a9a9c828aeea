//! Unified proxy error type.
//!
//! Every stage of the chat pipeline returns `Result<T, ProxyError>`, which
//! implements [`axum::response::IntoResponse`] so failures become a JSON
//! `{"error": ...}` body with the mapped status code.
//!
//! **Security note:** internal errors are logged with full detail but only a
//! generic message is returned to the caller.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// All errors that can occur while proxying a chat request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The caller sent an invalid or malformed request.
    #[error("{0}")]
    InvalidRequest(String),

    /// The request body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// No route matches the request path.
    #[error("not found")]
    NotFound,

    /// The path exists but not for this method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The client exhausted its request budget for the current window.
    #[error("Rate limit exceeded. Please wait before sending more messages.")]
    RateLimited,

    /// No upstream URL has been configured.
    #[error("chat service is not configured")]
    NotConfigured,

    /// The upstream did not answer within the configured timeout.
    #[error("upstream service timed out after {}s", .0.as_secs())]
    UpstreamTimeout(Duration),

    /// The upstream could not be reached.
    #[error("upstream service unavailable")]
    UpstreamUnavailable(#[source] reqwest::Error),

    /// The upstream answered with an empty or whitespace-only body.
    #[error("upstream service returned an empty response")]
    UpstreamEmptyResponse,

    /// The upstream answered with a non-success status.
    #[error("upstream service error (status {status})")]
    UpstreamError { status: u16 },

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::NotConfigured
            | ProxyError::UpstreamUnavailable(_)
            | ProxyError::UpstreamEmptyResponse => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamError { .. } | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let client_message = match &self {
            ProxyError::UpstreamUnavailable(e) => {
                warn!(error = %e, "upstream transport failure");
                self.to_string()
            }
            ProxyError::Internal(m) => {
                error!(message = %m, "internal proxy error");
                "internal server error".to_owned()
            }
            other => {
                if status.is_server_error() {
                    warn!(error = %other, status = status.as_u16(), "chat request failed");
                }
                other.to_string()
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(ProxyError::InvalidRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ProxyError::PayloadTooLarge { limit: 1024 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ProxyError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ProxyError::MethodNotAllowed.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            ProxyError::UpstreamTimeout(Duration::from_secs(60)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(ProxyError::UpstreamEmptyResponse.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ProxyError::NotConfigured.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ProxyError::UpstreamError { status: 502 }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn upstream_error_message_includes_status() {
        let resp = ProxyError::UpstreamError { status: 418 }.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("418"));
    }

    #[tokio::test]
    async fn payload_too_large_names_the_limit() {
        let resp = ProxyError::PayloadTooLarge { limit: 2048 }.into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "request body exceeds 2048 bytes");
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let resp = ProxyError::Internal("db password is hunter2".into()).into_response();
        let body = body_json(resp).await;
        assert_eq!(body["error"], "internal server error");
    }
}
