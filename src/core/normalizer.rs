//! Response normalization.
//!
//! Applied to every backend response before it reaches the caller: transport
//! headers are stripped, a successful buffered JSON body gets its
//! `@odata.context` pointed back at the proxy, and any non-2xx answer is
//! turned into a 502 with a best-effort, sanitized detail message.
use axum::body::Body as AxumBody;
use bytes::Bytes;
use http::{Response, StatusCode, header};
use http_body_util::{BodyExt, Limited};
use serde_json::Value;

use crate::core::{
    error::{DETAIL_BAD_GATEWAY, ProxyError, ProxyResult},
    headers::strip_hop_by_hop,
    translator::Mode,
};

pub const ODATA_CONTEXT: &str = "@odata.context";

/// Upper bound on how much of an error body is read.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Longest detail message passed on to the caller.
const MAX_DETAIL_CHARS: usize = 500;

pub async fn normalize(
    response: Response<AxumBody>,
    original_url: &str,
    mode: Mode,
) -> ProxyResult<Response<AxumBody>> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);

    if !parts.status.is_success() {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        // An unreadable error body only costs us the detail text
        let bytes = Limited::new(body, MAX_ERROR_BODY_BYTES)
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .unwrap_or_default();

        tracing::warn!(
            status = parts.status.as_u16(),
            mode = mode.as_str(),
            "Backend answered with an error status"
        );
        return Err(ProxyError::bad_gateway(failure_detail(
            parts.status,
            content_type.as_deref(),
            &bytes,
        )));
    }

    if mode.backend().is_streaming() {
        return Ok(Response::from_parts(parts, body));
    }

    let bytes = body
        .collect()
        .await
        .map_err(|e| ProxyError::bad_gateway_from(DETAIL_BAD_GATEWAY, e))?
        .to_bytes();

    Ok(Response::from_parts(
        parts,
        AxumBody::from(rewrite_context(bytes, original_url)),
    ))
}

/// Replace `@odata.context` with the caller-facing URL, keeping key order.
/// Anything that is not a JSON object carrying that key is returned as is.
pub fn rewrite_context(bytes: Bytes, original_url: &str) -> Bytes {
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut object)) if object.contains_key(ODATA_CONTEXT) => {
            object.insert(
                ODATA_CONTEXT.to_string(),
                Value::String(original_url.to_string()),
            );
            serde_json::to_vec(&object)
                .map(Bytes::from)
                .unwrap_or(bytes)
        }
        _ => bytes,
    }
}

/// Detail message for a non-2xx backend answer.
pub fn failure_detail(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> String {
    let media_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mt| mt.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let detail = match media_type.as_str() {
        "application/json" | "application/problem+json" => {
            match serde_json::from_slice::<Value>(body) {
                Ok(value) => upstream_message(&value).or_else(|| body_text(body)),
                Err(_) => body_text(body),
            }
        }
        "text/html" => None,
        _ => body_text(body),
    };

    match detail.map(|text| sanitize(&text)) {
        Some(text) if !text.is_empty() => text,
        _ => format!(
            "Unexpected HTTP {} from internal endpoint",
            status.as_u16()
        ),
    }
}

fn upstream_message(value: &Value) -> Option<String> {
    if let Value::String(text) = value {
        return Some(text.clone());
    }
    [
        value.pointer("/error/message"),
        value.get("detail"),
        value.get("title"),
        value.get("message"),
    ]
    .into_iter()
    .flatten()
    .find_map(|candidate| candidate.as_str().map(str::to_string))
}

fn body_text(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn sanitize(text: &str) -> String {
    text.trim().chars().take(MAX_DETAIL_CHARS).collect()
}
