//! Backend invoker.
//!
//! Executes an [`OutboundCall`] against the shared HTTP client: attaches the
//! backend token when the call asks for one, bounds the wait for response
//! headers and maps every failure to a bad gateway. There are no retries.
use std::{sync::Arc, time::Duration};

use axum::body::Body as AxumBody;
use hyper::{Request, Response, Uri, header, header::HeaderValue};

use crate::{
    config::models::{ExportBackendConfig, SearchBackendConfig},
    core::{
        error::{DETAIL_BAD_GATEWAY, ProxyError, ProxyResult},
        headers::merge,
        translator::{Backend, Credential, OutboundCall},
    },
    metrics::{self, BackendRequestTimer},
    ports::{
        http_client::{HttpClient, HttpClientError},
        token_source::TokenSource,
    },
};

pub struct BackendInvoker {
    client: Arc<dyn HttpClient>,
    tokens: Arc<dyn TokenSource>,
    token_audience: String,
    search_timeout_secs: u64,
    export_timeout_secs: u64,
}

impl BackendInvoker {
    pub fn new(
        client: Arc<dyn HttpClient>,
        tokens: Arc<dyn TokenSource>,
        search: &SearchBackendConfig,
        export: &ExportBackendConfig,
    ) -> Self {
        Self {
            client,
            tokens,
            token_audience: search.token_audience.clone(),
            search_timeout_secs: search.timeout_secs,
            export_timeout_secs: export.timeout_secs,
        }
    }

    fn timeout_secs(&self, backend: Backend) -> u64 {
        match backend {
            Backend::Search => self.search_timeout_secs,
            Backend::Export => self.export_timeout_secs,
        }
    }

    async fn bearer_header(&self) -> ProxyResult<HeaderValue> {
        let token = self
            .tokens
            .fetch_token(&self.token_audience)
            .await
            .map_err(|e| {
                metrics::increment_token_fetch_failures();
                ProxyError::bad_gateway_from(DETAIL_BAD_GATEWAY, e)
            })?;

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.secret()))
            .map_err(|e| ProxyError::bad_gateway_from(DETAIL_BAD_GATEWAY, e))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Send the call and return the raw backend response (headers received,
    /// body possibly still streaming).
    pub async fn invoke(&self, call: OutboundCall) -> ProxyResult<Response<AxumBody>> {
        let OutboundCall {
            backend,
            method,
            url,
            mut headers,
            body,
            credential,
        } = call;

        if credential == Credential::BackendToken {
            headers.insert(header::AUTHORIZATION, self.bearer_header().await?);
        }

        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| ProxyError::Internal(format!("Unusable backend URI: {e}")))?;
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.map(AxumBody::from).unwrap_or_else(AxumBody::empty))
            .map_err(|e| ProxyError::Internal(format!("Failed to build backend request: {e}")))?;
        merge(request.headers_mut(), headers);

        let timeout_secs = self.timeout_secs(backend);
        let _timer = BackendRequestTimer::new(backend.as_str());

        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.client.send_request(request),
        )
        .await
        {
            Ok(Ok(response)) => {
                metrics::increment_backend_request_total(
                    backend.as_str(),
                    response.status().as_u16(),
                );
                Ok(response)
            }
            Ok(Err(e)) => {
                metrics::increment_backend_request_total(
                    backend.as_str(),
                    metrics::STATUS_NO_RESPONSE,
                );
                Err(ProxyError::bad_gateway_from(DETAIL_BAD_GATEWAY, e))
            }
            Err(_) => {
                metrics::increment_backend_request_total(
                    backend.as_str(),
                    metrics::STATUS_NO_RESPONSE,
                );
                Err(timeout_error(timeout_secs))
            }
        }
    }

    /// Run a follow-up read of a backend response (buffering its body) under
    /// the same per-backend timeout as the wait for its headers.
    pub async fn within_timeout<T, F>(&self, backend: Backend, read: F) -> ProxyResult<T>
    where
        F: Future<Output = ProxyResult<T>>,
    {
        let timeout_secs = self.timeout_secs(backend);
        match tokio::time::timeout(Duration::from_secs(timeout_secs), read).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    backend = backend.as_str(),
                    timeout_secs,
                    "Backend stalled while sending the response body"
                );
                Err(timeout_error(timeout_secs))
            }
        }
    }
}

fn timeout_error(timeout_secs: u64) -> ProxyError {
    ProxyError::bad_gateway_from(
        format!("Backend did not respond within {timeout_secs} seconds."),
        HttpClientError::Timeout(timeout_secs),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use url::Url;

    use super::*;
    use crate::adapters::test_support::{FakeHttpClient, FakeTokenSource};

    fn invoker(client: Arc<FakeHttpClient>, tokens: Arc<FakeTokenSource>) -> BackendInvoker {
        let search = SearchBackendConfig {
            timeout_secs: 1,
            ..SearchBackendConfig::default()
        };
        BackendInvoker::new(client, tokens, &search, &ExportBackendConfig::default())
    }

    fn search_call() -> OutboundCall {
        OutboundCall {
            backend: Backend::Search,
            method: Method::POST,
            url: Url::parse("https://search.example/indexes/idx/docs/search?api-version=1")
                .unwrap(),
            headers: HeaderMap::new(),
            body: Some(Bytes::from_static(b"{\"count\":true}")),
            credential: Credential::BackendToken,
        }
    }

    #[tokio::test]
    async fn test_backend_token_is_injected() {
        let client = Arc::new(FakeHttpClient::json(StatusCode::OK, "{}"));
        let tokens = Arc::new(FakeTokenSource::new("backend-token"));

        let response = invoker(client.clone(), tokens.clone())
            .invoke(search_call())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(
            requests[0].headers[header::AUTHORIZATION],
            "Bearer backend-token"
        );
        assert_eq!(requests[0].body, "{\"count\":true}");
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forwarded_credential_skips_token_source() {
        let client = Arc::new(FakeHttpClient::json(StatusCode::OK, "{}"));
        let tokens = Arc::new(FakeTokenSource::new("backend-token"));

        let mut call = search_call();
        call.backend = Backend::Export;
        call.method = Method::GET;
        call.body = None;
        call.credential = Credential::Forwarded;
        call.headers
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer caller"));

        invoker(client.clone(), tokens.clone())
            .invoke(call)
            .await
            .unwrap();

        assert_eq!(tokens.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            client.requests()[0].headers[header::AUTHORIZATION],
            "Bearer caller"
        );
    }

    #[tokio::test]
    async fn test_token_failure_is_bad_gateway_without_call() {
        let client = Arc::new(FakeHttpClient::json(StatusCode::OK, "{}"));
        let tokens = Arc::new(FakeTokenSource::failing());

        let err = invoker(client.clone(), tokens)
            .invoke(search_call())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.detail(), DETAIL_BAD_GATEWAY);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_bad_gateway() {
        let client = Arc::new(FakeHttpClient::unreachable());
        let tokens = Arc::new(FakeTokenSource::new("t"));

        let err = invoker(client, tokens)
            .invoke(search_call())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.detail(), DETAIL_BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let client = Arc::new(
            FakeHttpClient::json(StatusCode::OK, "{}").with_delay(Duration::from_secs(5)),
        );
        let tokens = Arc::new(FakeTokenSource::new("t"));

        let err = invoker(client, tokens)
            .invoke(search_call())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.detail(), "Backend did not respond within 1 seconds.");
    }

    #[tokio::test]
    async fn test_stalled_body_read_times_out() {
        let client = Arc::new(FakeHttpClient::json(StatusCode::OK, "{}"));
        let tokens = Arc::new(FakeTokenSource::new("t"));

        let err = invoker(client, tokens)
            .within_timeout(Backend::Search, std::future::pending::<ProxyResult<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.detail(), "Backend did not respond within 1 seconds.");
    }
}
