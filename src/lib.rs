//! Dataselect proxy - a translation proxy in front of a managed search index
//! and a CSV export API.
//!
//! Callers query a dataset with plain query parameters (`sort`, `page`,
//! `export` and arbitrary field filters). The proxy rewrites that into the
//! search backend's native request (OData style `filter`/`orderby`, facets,
//! paging), or into a streamed CSV export call, injects backend credentials
//! and cleans the backend response up before it reaches the caller.
//!
//! # Features
//! - Dataset registry mapping public ids to backend indexes and export paths
//! - Filtered, sorted and paginated search plus a fixed address lookup
//! - Streaming CSV export with the caller's credentials forwarded
//! - Scope check per dataset on the caller's bearer token
//! - `@odata.context` rewriting and sanitized backend error details
//! - Structured tracing, `metrics` facade counters, graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use dataselect_proxy::{
//!     adapters::{HttpClientAdapter, HttpHandler, JwtScopeGate, StaticTokenSource},
//!     config::ServerConfig,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = ServerConfig::builder()
//!     .search_base_url("https://example.search.windows.net/indexes")
//!     .export_base_url("https://api.example")
//!     .static_token("dev-token")
//!     .build()
//!     .map_err(|e| eyre::eyre!(e))?;
//!
//! let gate = JwtScopeGate::from_config(&config.auth).await?;
//! let handler = HttpHandler::new(
//!     &config,
//!     Arc::new(HttpClientAdapter::new()?),
//!     Arc::new(StaticTokenSource::new("dev-token")),
//!     Arc::new(gate),
//! )?;
//! let app = Arc::new(handler).router(&config.url_prefix);
//! let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the translation and normalization logic inside `core`, free of IO.
//!
//! # Error Handling
//! Request handling returns [`core::ProxyError`], rendered as `{"detail": "..."}`.
//! Startup code returns `eyre::Result<T>` with `WrapErr` context attached.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler},
    core::{DatasetRegistry, Mode, ProxyError, Translator},
    ports::{capability_gate::CapabilityGate, http_client::HttpClient, token_source::TokenSource},
    utils::GracefulShutdown,
};
