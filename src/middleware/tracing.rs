//! Request tracing middleware

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Correlation id echoed back on every response
pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn request_id(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 64)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Log each request inside a span carrying its correlation id
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request_id(&request);

    let span = tracing::info_span!("request", request_id = %request_id, method = %method, path = %path);
    let start = Instant::now();

    let mut response = next.run(request).instrument(span.clone()).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status();

    span.in_scope(|| {
        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), duration_ms = %duration_ms, "Request failed");
        } else if status.is_client_error() {
            tracing::warn!(status = %status.as_u16(), duration_ms = %duration_ms, "Request rejected");
        } else {
            tracing::info!(status = %status.as_u16(), duration_ms = %duration_ms, "Request completed");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
