//! Axum middleware attached to the proxy router.
//!
//! Both layers are stateless: one tags every request with an id, the other
//! logs start and completion with latency.
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Log start/end of a request including latency. Only the path is logged;
/// query strings carry caller filters.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let version = req.version();

    tracing::info!("Started processing {} {} {:?}", method, path, version);

    let response = next.run(req).await;

    tracing::info!(
        "Completed {} {} {:?} - {} in {:?}",
        method,
        path,
        version,
        response.status(),
        start.elapsed()
    );

    response
}

/// Tag the request with an id (the caller's `X-Request-ID` when it is a
/// sane token, a fresh UUID otherwise), run it inside a span carrying that
/// id and echo it back on the response.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| {
            !v.is_empty()
                && v.len() <= 128
                && v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}
