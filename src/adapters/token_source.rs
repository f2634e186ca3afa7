//! Backend token sources.
//!
//! Three flavours, selected by `credentials.type`:
//! * `static` hands out a configured token (local development)
//! * `client_credentials` runs the OAuth2 client credentials grant
//! * `managed_identity` asks the Azure instance metadata service
//!
//! The remote sources cache a token until shortly before it expires.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    config::models::CredentialsConfig,
    ports::token_source::{AccessToken, TokenError, TokenSource},
};

const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Tokens are refreshed this long before the issuer's expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Build the token source described by the configuration.
pub fn token_source_from_config(config: &CredentialsConfig) -> Result<Arc<dyn TokenSource>> {
    let source: Arc<dyn TokenSource> = match config {
        CredentialsConfig::Static { token } => Arc::new(StaticTokenSource::new(token.clone())),
        CredentialsConfig::ClientCredentials {
            token_url,
            client_id,
            client_secret,
        } => Arc::new(ClientCredentialsTokenSource::new(
            token_url.clone(),
            client_id.clone(),
            client_secret.clone(),
        )?),
        CredentialsConfig::ManagedIdentity {
            client_id,
            endpoint,
        } => Arc::new(ManagedIdentityTokenSource::new(
            endpoint.clone(),
            client_id.clone(),
        )?),
    };
    Ok(source)
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .wrap_err("Failed to build token HTTP client")
}

pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self, _audience: &str) -> Result<AccessToken, TokenError> {
        Ok(self.token.clone())
    }
}

/// Last token handed out, keyed by audience.
#[derive(Default)]
struct TokenCache {
    entry: Option<(String, AccessToken, Instant)>,
}

impl TokenCache {
    fn get(&self, audience: &str) -> Option<AccessToken> {
        match &self.entry {
            Some((cached_for, token, valid_until))
                if cached_for == audience && Instant::now() < *valid_until =>
            {
                Some(token.clone())
            }
            _ => None,
        }
    }

    fn put(&mut self, audience: &str, token: AccessToken, expires_in: Option<u64>) {
        let Some(expires_in) = expires_in else {
            self.entry = None;
            return;
        };
        let lifetime = Duration::from_secs(expires_in).saturating_sub(EXPIRY_MARGIN);
        self.entry = Some((audience.to_string(), token, Instant::now() + lifetime));
    }
}

/// Pull `access_token` and `expires_in` out of a token endpoint answer.
/// `expires_in` is a number for OAuth2 servers and a string for IMDS.
fn parse_token_response(body: &Value) -> Result<(AccessToken, Option<u64>), TokenError> {
    let token = body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TokenError::Malformed("missing access_token".to_string()))?;

    let expires_in = match body.get("expires_in") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    Ok((AccessToken::new(token), expires_in))
}

async fn read_token_response(
    response: reqwest::Response,
) -> Result<(AccessToken, Option<u64>), TokenError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(TokenError::Rejected {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        });
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    parse_token_response(&body)
}

pub struct ClientCredentialsTokenSource {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cache: Mutex<TokenCache>,
}

impl ClientCredentialsTokenSource {
    pub fn new(token_url: String, client_id: String, client_secret: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            token_url,
            client_id,
            client_secret,
            cache: Mutex::new(TokenCache::default()),
        })
    }
}

#[async_trait]
impl TokenSource for ClientCredentialsTokenSource {
    async fn fetch_token(&self, audience: &str) -> Result<AccessToken, TokenError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(audience) {
            return Ok(token);
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", audience),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenError::Transport(e.to_string()))?;

        let (token, expires_in) = read_token_response(response).await?;
        tracing::debug!(audience, ?expires_in, "Fetched backend token via client credentials");
        cache.put(audience, token.clone(), expires_in);
        Ok(token)
    }
}

pub struct ManagedIdentityTokenSource {
    http: reqwest::Client,
    endpoint: String,
    client_id: Option<String>,
    cache: Mutex<TokenCache>,
}

impl ManagedIdentityTokenSource {
    pub fn new(endpoint: Option<String>, client_id: Option<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_IMDS_ENDPOINT.to_string()),
            client_id,
            cache: Mutex::new(TokenCache::default()),
        })
    }
}

/// IMDS wants a resource URI, not an OAuth2 `/.default` scope.
fn resource_for(audience: &str) -> &str {
    audience.strip_suffix("/.default").unwrap_or(audience)
}

#[async_trait]
impl TokenSource for ManagedIdentityTokenSource {
    async fn fetch_token(&self, audience: &str) -> Result<AccessToken, TokenError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(audience) {
            return Ok(token);
        }

        let mut query = vec![
            ("api-version", IMDS_API_VERSION),
            ("resource", resource_for(audience)),
        ];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| TokenError::Transport(e.to_string()))?;

        let (token, expires_in) = read_token_response(response).await?;
        tracing::debug!(audience, ?expires_in, "Fetched backend token via managed identity");
        cache.put(audience, token.clone(), expires_in);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    const AUDIENCE: &str = "https://search.azure.com/.default";

    #[tokio::test]
    async fn test_static_source() {
        let source = token_source_from_config(&CredentialsConfig::Static {
            token: "dev".to_string(),
        })
        .unwrap();
        assert_eq!(source.fetch_token(AUDIENCE).await.unwrap().secret(), "dev");
    }

    #[test]
    fn test_parse_token_response() {
        let (token, expires) =
            parse_token_response(&json!({"access_token": "abc", "expires_in": "3599"})).unwrap();
        assert_eq!(token.secret(), "abc");
        assert_eq!(expires, Some(3599));

        let (_, expires) =
            parse_token_response(&json!({"access_token": "abc", "expires_in": 60})).unwrap();
        assert_eq!(expires, Some(60));

        assert!(matches!(
            parse_token_response(&json!({"token_type": "Bearer"})),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_resource_for_strips_default_scope() {
        assert_eq!(resource_for(AUDIENCE), "https://search.azure.com");
        assert_eq!(resource_for("api://x"), "api://x");
    }

    #[test]
    fn test_token_debug_hides_secret() {
        let token = AccessToken::new("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn test_client_credentials_grant_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "proxy".into()),
                Matcher::UrlEncoded("scope".into(), AUDIENCE.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"cc-token","expires_in":3600,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let source = ClientCredentialsTokenSource::new(
            format!("{}/oauth2/token", server.url()),
            "proxy".to_string(),
            "secret".to_string(),
        )
        .unwrap();

        assert_eq!(source.fetch_token(AUDIENCE).await.unwrap().secret(), "cc-token");
        assert_eq!(source.fetch_token(AUDIENCE).await.unwrap().secret(), "cc-token");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_managed_identity_request_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/metadata/identity/oauth2/token")
            .match_header("metadata", "true")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api-version".into(), IMDS_API_VERSION.into()),
                Matcher::UrlEncoded("resource".into(), "https://search.azure.com".into()),
                Matcher::UrlEncoded("client_id".into(), "uami".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"mi-token","expires_in":"86399"}"#)
            .create_async()
            .await;

        let source = ManagedIdentityTokenSource::new(
            Some(format!("{}/metadata/identity/oauth2/token", server.url())),
            Some("uami".to_string()),
        )
        .unwrap();

        assert_eq!(source.fetch_token(AUDIENCE).await.unwrap().secret(), "mi-token");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_grant_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(401)
            .with_body("invalid_client")
            .create_async()
            .await;

        let source = ClientCredentialsTokenSource::new(
            format!("{}/token", server.url()),
            "proxy".to_string(),
            "wrong".to_string(),
        )
        .unwrap();

        match source.fetch_token(AUDIENCE).await {
            Err(TokenError::Rejected { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid_client");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
