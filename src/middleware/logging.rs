//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, caller and latency.

use crate::middleware::principal::extract_caller;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Logs at INFO for completed requests, WARN for 5xx. Mutations carry the
/// caller principal when the principal middleware resolved one.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Skip logging for health checks
    if path == "/health" {
        return next.run(request).await;
    }

    let caller = extract_caller(&request)
        .map(|c| c.0.to_string())
        .unwrap_or_else(|| "-".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(
            method = %method,
            path = %path,
            status = status,
            caller = %caller,
            latency_ms = latency.as_millis(),
            "Request failed (5xx)"
        );
    } else if status >= 400 {
        debug!(
            method = %method,
            path = %path,
            status = status,
            caller = %caller,
            latency_ms = latency.as_millis(),
            "Request rejected (4xx)"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status,
            caller = %caller,
            latency_ms = latency.as_millis(),
            "Request completed"
        );
    }

    response
}
