//! Request-scoped tracing.
//!
//! Each request runs inside an `http_request` span keyed by a trace id. The
//! id is taken from an incoming `x-trace-id` header when it parses as a UUID,
//! minted otherwise, and echoed on the response. Bodies are never touched:
//! `/chat` responses are long-lived SSE streams.

use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub const X_TRACE_ID: &str = "x-trace-id";

fn trace_id_of(req: &Request) -> Uuid {
    req.headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .unwrap_or_else(Uuid::new_v4)
}

pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let started = Instant::now();
    let trace_id = trace_id_of(&req);
    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    // A hyphenated UUID is always a valid header value.
    let header = HeaderValue::from_str(&trace_id.to_string()).ok();
    if let Some(v) = &header {
        req.headers_mut().insert(X_TRACE_ID, v.clone());
    }

    let mut response = next.run(req).instrument(span.clone()).await;
    if let Some(v) = header {
        response.headers_mut().insert(X_TRACE_ID, v);
    }

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request handled"
        );
    });
    response
}
