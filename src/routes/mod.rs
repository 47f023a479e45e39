//! HTTP route handlers.

pub mod chat;
pub mod responses;

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use tracing::error;

/// Bearer token from the `Authorization` header, forwarded to the provider.
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Provider family override from `x-model-provider`.
pub fn provider_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-model-provider")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Build a `text/event-stream` response around a body stream.
pub fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|e| {
            error!("Failed to build streaming response: {}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .expect("static response builds")
        })
}
