use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TokenError {
    /// Token endpoint could not be reached
    #[error("Token endpoint unreachable: {0}")]
    Transport(String),

    /// Token endpoint answered, but not with a usable token
    #[error("Token endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// Bearer token for the search backend.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

// Never print the token itself
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Opaque source of backend credentials.
///
/// Called once per outbound search request; implementations may cache, but
/// callers never assume they do.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    /// Fetch a token valid for `audience`.
    async fn fetch_token(&self, audience: &str) -> Result<AccessToken, TokenError>;
}
