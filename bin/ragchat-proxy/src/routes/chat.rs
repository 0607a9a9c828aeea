//! `POST /chat`: the streaming proxy endpoint.
//!
//! Each request moves through parse → rate-limit → forward → normalize →
//! stream. Any stage may fail with a [`ProxyError`], which becomes a JSON
//! error body; nothing escapes to the transport unhandled.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use ragchat_types::{ChatRequest, EVENT_STREAM_CONTENT_TYPE};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ProxyError;
use crate::state::AppState;

/// Fallback rate-limit key when no client address header is present.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Register chat routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ProxyError> {
    let body = body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ProxyError::PayloadTooLarge {
            limit: state.config.max_body_bytes,
        },
        _ => ProxyError::InvalidRequest(rejection.body_text()),
    })?;
    let req = parse_request(&body)?;

    let client = client_key(&headers);
    if !state.limiter.allow(&client).await {
        warn!(client = %client, "rate limit exceeded");
        return Err(ProxyError::RateLimited);
    }

    info!(
        model = %req.model,
        conversation_id = ?req.conversation_id,
        messages = req.messages.len(),
        "chat request"
    );

    let reply = state.upstream.forward(&req).await?;
    let body = state.normalizer.normalize(reply)?;

    Ok((
        [
            (CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// Decode and validate the inbound body.
pub fn parse_request(body: &[u8]) -> Result<ChatRequest, ProxyError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("request body is not valid JSON: {e}")))?;

    match value.get("messages") {
        Some(Value::Array(items)) if !items.is_empty() => {}
        _ => return Err(ProxyError::InvalidRequest("Messages array is required".into())),
    }

    serde_json::from_value(value)
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid chat request: {e}")))
}

/// Best-effort client address used as the rate-limit key.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let connecting = || {
        headers
            .get("cf-connecting-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(connecting)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_owned()
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;
    use tracing_test::traced_test;

    use crate::config::Config;
    use crate::limiter::FixedWindowLimiter;

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/hook")
    }

    fn app(upstream_url: Option<String>, rate_limit: u32) -> Router {
        app_with(Config {
            upstream_url,
            upstream_timeout: Duration::from_secs(5),
            rate_limit,
            ..Config::default()
        })
    }

    fn app_with(config: Config) -> Router {
        let limiter = FixedWindowLimiter::new(config.rate_limit, config.rate_window, 100);
        crate::routes::build(Arc::new(AppState::with_limiter(config, Arc::new(limiter))))
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/chat")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "10.0.0.1, 172.16.0.1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn valid_body() -> Value {
        json!({
            "messages": [{ "role": "user", "content": "What is grace?" }],
            "model": "gpt-5",
            "conversationId": "conv-42"
        })
    }

    async fn body_text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn error_of(resp: Response) -> String {
        let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        body["error"].as_str().unwrap().to_owned()
    }

    fn assert_cors(resp: &Response) {
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            resp.headers()["access-control-allow-headers"],
            "authorization, x-client-info, apikey, content-type"
        );
    }

    #[test]
    fn client_key_prefers_forwarded_for() {
        let mut h = HeaderMap::new();
        assert_eq!(client_key(&h), UNKNOWN_CLIENT);
        h.insert("cf-connecting-ip", "9.9.9.9".parse().unwrap());
        assert_eq!(client_key(&h), "9.9.9.9");
        h.insert("x-forwarded-for", " 1.1.1.1 , 2.2.2.2".parse().unwrap());
        assert_eq!(client_key(&h), "1.1.1.1");
    }

    #[test]
    fn parse_rejects_missing_or_empty_messages() {
        for body in [
            json!({}),
            json!({ "messages": "hello" }),
            json!({ "messages": [] }),
        ] {
            let err = parse_request(body.to_string().as_bytes()).unwrap_err();
            assert!(matches!(err, ProxyError::InvalidRequest(_)), "body {body}");
        }
        assert!(matches!(parse_request(b"not json"), Err(ProxyError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn json_upstream_is_normalized_to_sse() {
        let url = spawn_upstream(Router::new().route(
            "/hook",
            post(|| async { axum::Json(json!({ "content": "Grace is..." })) }),
        ))
        .await;

        let resp = app(Some(url), 30).oneshot(chat_request(valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");
        assert_cors(&resp);
        assert!(resp.headers().contains_key("x-trace-id"));
        assert_eq!(
            body_text(resp).await,
            "data: {\"choices\":[{\"delta\":{\"content\":\"Grace is...\"}}]}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn event_stream_upstream_is_relayed() {
        let upstream_body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        let url = spawn_upstream(Router::new().route(
            "/hook",
            post(move || async move { ([(CONTENT_TYPE, "text/event-stream")], upstream_body) }),
        ))
        .await;

        let resp = app(Some(url), 30).oneshot(chat_request(valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, upstream_body);
    }

    #[tokio::test]
    async fn invalid_body_is_400_with_cors() {
        let resp = app(None, 30)
            .oneshot(chat_request(json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_cors(&resp);
        let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["error"], "Messages array is required");
    }

    #[tokio::test]
    #[traced_test]
    async fn thirty_first_request_is_rate_limited() {
        let url = spawn_upstream(Router::new().route("/hook", post(|| async { "ok" }))).await;
        let app = app(Some(url), 30);

        for i in 1..=30 {
            let resp = app.clone().oneshot(chat_request(valid_body())).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "request {i}");
        }
        let resp = app.oneshot(chat_request(valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_cors(&resp);
        assert!(logs_contain("rate limit exceeded"));
    }

    #[tokio::test]
    async fn empty_upstream_body_is_503() {
        let url = spawn_upstream(Router::new().route("/hook", post(|| async { "   " }))).await;
        let resp = app(Some(url), 30).oneshot(chat_request(valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn blank_content_field_is_503() {
        let url = spawn_upstream(Router::new().route(
            "/hook",
            post(|| async { axum::Json(json!({ "output": "" })) }),
        ))
        .await;
        let resp = app(Some(url), 30).oneshot(chat_request(valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_cors(&resp);
        assert_eq!(error_of(resp).await, "upstream service returned an empty response");
    }

    #[tokio::test]
    async fn upstream_failure_status_is_500() {
        let url = spawn_upstream(Router::new().route(
            "/hook",
            post(|| async { (StatusCode::NOT_FOUND, "missing workflow") }),
        ))
        .await;
        let resp = app(Some(url), 30).oneshot(chat_request(valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn unconfigured_upstream_is_503() {
        let resp = app(None, 30).oneshot(chat_request(valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn options_short_circuits_with_cors() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/chat")
            .body(Body::empty())
            .unwrap();
        let resp = app(None, 0).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_cors(&resp);
        assert!(body_text(resp).await.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_413_json() {
        let app = app_with(Config {
            max_body_bytes: 64,
            ..Config::default()
        });
        let mut body = valid_body();
        body["messages"][0]["content"] = json!("x".repeat(256));

        let resp = app.oneshot(chat_request(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_cors(&resp);
        assert_eq!(error_of(resp).await, "request body exceeds 64 bytes");
    }

    #[tokio::test]
    async fn wrong_method_is_405_json() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/chat")
            .body(Body::empty())
            .unwrap();
        let resp = app(None, 30).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_cors(&resp);
        assert_eq!(error_of(resp).await, "method not allowed");
    }

    #[tokio::test]
    async fn unknown_path_is_404_json() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/chats")
            .body(Body::empty())
            .unwrap();
        let resp = app(None, 30).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_cors(&resp);
        assert_eq!(error_of(resp).await, "not found");
    }
}
