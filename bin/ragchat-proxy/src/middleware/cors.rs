//! Permissive CORS for browser clients.
//!
//! Every response, success or error, carries the same allow-origin and
//! allow-headers pair, and bare `OPTIONS` requests are answered before any
//! handler runs.

use axum::Router;
use axum::body::Body;
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::warn;

pub const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// Answer preflight requests with an empty 200.
pub async fn preflight(req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(req).await
}

/// Wrap `router` with the preflight short-circuit and the CORS headers.
///
/// Header layers sit outside the preflight middleware so short-circuited
/// responses get them too.
pub fn apply<S>(router: Router<S>, allow_origin: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let origin = HeaderValue::from_str(allow_origin).unwrap_or_else(|e| {
        warn!(origin = %allow_origin, error = %e, "invalid CORS origin; falling back to '*'");
        HeaderValue::from_static("*")
    });

    router
        .layer(middleware::from_fn(preflight))
        .layer(SetResponseHeaderLayer::overriding(ACCESS_CONTROL_ALLOW_ORIGIN, origin))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
}
