use std::collections::BTreeSet;

use async_trait::async_trait;
use http::HeaderMap;

use crate::core::error::ProxyResult;

/// Decides whether a caller may read a dataset.
#[async_trait]
pub trait CapabilityGate: Send + Sync + 'static {
    /// Scopes carried by the caller's credentials. No credentials means an
    /// empty set; unverifiable credentials are an error.
    async fn token_scopes(&self, headers: &HeaderMap) -> ProxyResult<BTreeSet<String>>;

    /// True when `scopes` holds every scope in `required`.
    fn is_authorized_for(&self, scopes: &BTreeSet<String>, required: &BTreeSet<String>) -> bool {
        required.is_subset(scopes)
    }
}
