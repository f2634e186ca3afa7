use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

pub const USER_AGENT: &str = "Dataselect-Proxy/1.0";

/// HTTP client adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * Keeps one connection pool shared by every request
/// * Stamps each outbound request with the proxy's `User-Agent`, an
///   `Accept-Encoding: identity` and the `Host` of the target
/// * Forces request version to HTTP/1.1
/// * Converts between Hyper body and Axum body types
///
/// Timeouts and retries are not handled here; the backend invoker bounds the
/// wait for response headers.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::info!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::info!("Created pooled backend HTTP client");
        Ok(Self { client })
    }

    /// Inject the proxy's fixed outbound headers.
    fn add_common_headers(req: &mut Request<AxumBody>) {
        let headers = req.headers_mut();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        // Bodies are relayed byte for byte, so upstream must not compress them
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );
    }

    fn set_host_header(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let Some(host) = req.uri().host() else {
            return Err(HttpClientError::InvalidRequest(format!(
                "Outgoing URI has no host: {}",
                req.uri()
            )));
        };
        let value = match req.uri().port() {
            Some(port) => format!("{host}:{}", port.as_u16()),
            None => host.to_string(),
        };
        let value = HeaderValue::from_str(&value)
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
        req.headers_mut().insert(header::HOST, value);
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::add_common_headers(&mut req);
        Self::set_host_header(&mut req)?;

        let backend_identifier = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );

        let span = tracing::info_span!(
            "backend_request",
            backend.url = %backend_identifier,
            http.method = %req.method(),
            http.path = %req.uri().path(),
            http.status_code = tracing::field::Empty,
        );

        let (mut parts, axum_body) = req.into_parts();
        parts.version = Version::HTTP_11;

        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let outgoing_request = Request::from_parts(parts, axum_body);
        let client = self.client.clone();

        async move {
            tracing::debug!("Sending request: {} {}", method, uri.path());

            match client.request(outgoing_request).await {
                Ok(response) => {
                    tracing::Span::current().record("http.status_code", response.status().as_u16());

                    let (mut parts, hyper_body) = response.into_parts();
                    // Axum re-frames the body on the way out
                    parts.headers.remove(header::TRANSFER_ENCODING);

                    Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
                }
                Err(e) => {
                    tracing::Span::current().record("http.status_code", 599u16);
                    tracing::error!(
                        "Error making request to backend {} ({} {}): {}",
                        backend_identifier,
                        method,
                        uri.path(),
                        e
                    );

                    // The query string may carry caller filters; keep it out of the error
                    Err(HttpClientError::ConnectionError(format!(
                        "Request to {method} {backend_identifier}{} failed: {e}",
                        uri.path()
                    )))
                }
            }
        }
        .instrument(span)
        .await
    }
}
