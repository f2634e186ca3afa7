//! Named header operations used on both sides of the proxy.
//!
//! `http::HeaderMap` already gives ordered, case-insensitive storage; these
//! helpers give the removal/merge rules a single home.
use http::{HeaderMap, HeaderName, header};

/// Headers describing a single transport hop, plus the framing headers that
/// stop being true once the proxy re-serializes the body.
pub const HOP_BY_HOP: [HeaderName; 10] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    HeaderName::from_static("trailers"),
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
];

/// Remove every hop-by-hop header (all values).
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Keep only the listed headers, dropping everything else.
pub fn retain_only(headers: &HeaderMap, keep: &[HeaderName]) -> HeaderMap {
    let mut retained = HeaderMap::new();
    for name in keep {
        for value in headers.get_all(name) {
            retained.append(name.clone(), value.clone());
        }
    }
    retained
}

/// Insert every header of `src` into `dst`, replacing existing values.
pub fn merge(dst: &mut HeaderMap, src: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in src {
        // `None` marks further values of the previous header name
        match name {
            Some(name) => {
                dst.insert(name.clone(), value);
                current = Some(name);
            }
            None => {
                if let Some(name) = &current {
                    dst.append(name.clone(), value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("Connection", HeaderValue::from_static("keep-alive"));
        headers.insert("Keep-Alive", HeaderValue::from_static("timeout=5"));
        headers.insert("Transfer-Encoding", HeaderValue::from_static("chunked"));
        headers.insert("Content-Encoding", HeaderValue::from_static("gzip"));
        headers.insert("Content-Length", HeaderValue::from_static("42"));
        headers.insert("Trailers", HeaderValue::from_static("x"));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("X-Request-Id", HeaderValue::from_static("abc"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 2);
        assert!(headers.contains_key(header::CONTENT_TYPE));
        assert!(headers.contains_key("x-request-id"));
    }

    #[test]
    fn test_retain_only_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer caller"));
        headers.insert("X-User", HeaderValue::from_static("foobar"));
        headers.insert("Cookie", HeaderValue::from_static("session=1"));

        let retained = retain_only(&headers, &[header::AUTHORIZATION]);
        assert_eq!(retained.len(), 1);
        assert_eq!(retained["Authorization"], "Bearer caller");
    }

    #[test]
    fn test_merge_replaces_and_keeps_multi_values() {
        let mut dst = HeaderMap::new();
        dst.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        dst.insert(header::USER_AGENT, HeaderValue::from_static("curl"));

        let mut src = HeaderMap::new();
        src.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        src.append(header::VIA, HeaderValue::from_static("1.1 a"));
        src.append(header::VIA, HeaderValue::from_static("1.1 b"));

        merge(&mut dst, src);

        assert_eq!(dst[header::ACCEPT], "application/json");
        assert_eq!(dst[header::USER_AGENT], "curl");
        assert_eq!(dst.get_all(header::VIA).iter().count(), 2);
    }
}
