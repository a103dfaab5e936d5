use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tracing::debug;

/// Adds `X-Response-Time-Us` and `Server-Timing` to every response and logs
/// API calls at debug level. The SSE feed is not logged.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros() as u64;

    let headers = response.headers_mut();
    headers.insert("X-Response-Time-Us", HeaderValue::from(us));
    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = HeaderValue::from_str(&server_timing) {
        headers.insert("Server-Timing", val);
    }

    if path.starts_with("/api/") && !path.ends_with("/stream") {
        debug!(
            status = response.status().as_u16(),
            method = %method,
            path = %path,
            us,
            "request"
        );
    }

    response
}
