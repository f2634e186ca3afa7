pub mod backend;
pub mod http_client;
pub mod http_handler;
pub mod middleware;
pub mod scope_gate;
pub mod token_source;

#[cfg(test)]
pub(crate) mod test_support;

/// Re-export commonly used types from adapters
pub use backend::BackendInvoker;
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use middleware::*;
pub use scope_gate::JwtScopeGate;
pub use token_source::{
    ClientCredentialsTokenSource, ManagedIdentityTokenSource, StaticTokenSource,
    token_source_from_config,
};
