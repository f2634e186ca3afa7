use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body as AxumBody,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use eyre::{Result, WrapErr};
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tracing::Instrument;

use crate::{
    adapters::{
        backend::BackendInvoker,
        middleware::{request_id_middleware, request_timing_middleware},
    },
    config::models::ServerConfig,
    core::{
        error::{ProxyError, ProxyResult},
        normalizer::normalize,
        query::QueryParams,
        registry::DatasetRegistry,
        translator::{InboundRequest, Mode, Translator},
    },
    metrics::{self, RequestTimer},
    ports::{capability_gate::CapabilityGate, http_client::HttpClient, token_source::TokenSource},
};

/// Dataset answering the fixed address lookup.
pub const ADDRESS_DATASET: &str = "bag";

/// HTTP handler for the dataselect proxy.
///
/// Holds the immutable per-process state; shared across requests by `Arc`.
pub struct HttpHandler {
    registry: DatasetRegistry,
    translator: Translator,
    invoker: BackendInvoker,
    gate: Arc<dyn CapabilityGate>,
    public_scheme: Option<String>,
    public_host: Option<String>,
}

impl HttpHandler {
    pub fn new(
        config: &ServerConfig,
        http_client: Arc<dyn HttpClient>,
        tokens: Arc<dyn TokenSource>,
        gate: Arc<dyn CapabilityGate>,
    ) -> Result<Self> {
        let registry = DatasetRegistry::from_configs(&config.datasets)
            .wrap_err("Invalid dataset configuration")?;
        tracing::info!(datasets = ?registry.ids(), "Dataset registry built");

        Ok(Self {
            registry,
            translator: Translator::new(&config.search, &config.export),
            invoker: BackendInvoker::new(http_client, tokens, &config.search, &config.export),
            gate,
            public_scheme: config.public_scheme.clone(),
            public_host: config.public_host.clone(),
        })
    }

    /// Axum router serving the public API under `url_prefix`, plus `/status`.
    pub fn router(self: Arc<Self>, url_prefix: &str) -> Router {
        let prefix = url_prefix.trim_end_matches('/');
        Router::new()
            .route(&format!("{prefix}/{{dataset}}/search"), get(dataset_search))
            .route(
                &format!("{prefix}/{ADDRESS_DATASET}/search/adres"),
                get(address_search),
            )
            .route("/status", get(status))
            .fallback(not_found)
            .with_state(self)
            .layer(middleware::from_fn(request_timing_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(CompressionLayer::new())
    }

    /// Serve one dataset request; errors are rendered as the JSON envelope.
    pub async fn handle(
        &self,
        dataset_id: &str,
        mode: Option<Mode>,
        uri: &Uri,
        headers: HeaderMap,
    ) -> Response<AxumBody> {
        let params = QueryParams::parse(uri.query());
        let mode = mode.unwrap_or_else(|| Mode::for_dataset_request(&params));
        let _timer = RequestTimer::new(dataset_id, mode.as_str());

        let span = tracing::info_span!(
            "dataset_request",
            dataset = %dataset_id,
            mode = mode.as_str(),
            http.status_code = tracing::field::Empty,
        );
        let response = async {
            match self.proxy(dataset_id, mode, params, uri, headers).await {
                Ok(response) => response,
                Err(e) => e.into_response(),
            }
        }
        .instrument(span.clone())
        .await;

        let status = response.status().as_u16();
        span.record("http.status_code", status);
        metrics::increment_request_total(dataset_id, mode.as_str(), status);
        response
    }

    async fn proxy(
        &self,
        dataset_id: &str,
        mode: Mode,
        params: QueryParams,
        uri: &Uri,
        headers: HeaderMap,
    ) -> ProxyResult<Response<AxumBody>> {
        let dataset = self.registry.lookup(dataset_id)?;

        // Public datasets never look at the caller's token
        if !dataset.required_scopes.is_empty() {
            let scopes = self.gate.token_scopes(&headers).await?;
            if !self.gate.is_authorized_for(&scopes, &dataset.required_scopes) {
                return Err(ProxyError::Forbidden {
                    dataset: dataset.id.clone(),
                });
            }
        }

        let absolute_url = absolute_url(
            self.public_scheme.as_deref(),
            self.public_host.as_deref(),
            uri,
            &headers,
        );
        let inbound = InboundRequest {
            params,
            headers,
            absolute_url,
        };

        let call = self.translator.translate(&inbound, dataset, mode)?;
        tracing::debug!(backend = call.backend.as_str(), url = %call.url.path(), "Translated request");

        let response = self.invoker.invoke(call).await?;
        // Buffered bodies get the same budget as the headers; a 2xx export
        // returns before its stream is read
        self.invoker
            .within_timeout(
                mode.backend(),
                normalize(response, &inbound.absolute_url, mode),
            )
            .await
    }

    fn status_body(&self) -> serde_json::Value {
        json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "datasets": self.registry.ids(),
        })
    }
}

/// The URL the caller used, as seen from outside the proxy. A configured
/// public host wins over the caller's `Host` header.
pub fn absolute_url(
    public_scheme: Option<&str>,
    public_host: Option<&str>,
    uri: &Uri,
    headers: &HeaderMap,
) -> String {
    let scheme = public_scheme
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
        })
        .or_else(|| uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());

    let host = public_host
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());

    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("{scheme}://{host}{path_and_query}")
}

async fn dataset_search(
    State(handler): State<Arc<HttpHandler>>,
    Path(dataset): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response<AxumBody> {
    handler.handle(&dataset, None, &uri, headers).await
}

async fn address_search(
    State(handler): State<Arc<HttpHandler>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response<AxumBody> {
    handler
        .handle(ADDRESS_DATASET, Some(Mode::AddressSearch), &uri, headers)
        .await
}

async fn status(State(handler): State<Arc<HttpHandler>>) -> Json<serde_json::Value> {
    Json(handler.status_body())
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." })))
}
