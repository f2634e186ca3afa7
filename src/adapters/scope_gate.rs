//! JWT based capability gate.
//!
//! Verifies the caller's bearer token and reports the scopes it carries.
//! Scopes are collected from the `scopes` array claim, the space separated
//! `scp` claim and `realm_access.roles`.
use std::collections::BTreeSet;

use async_trait::async_trait;
use eyre::{Result, WrapErr, eyre};
use http::{HeaderMap, header};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    jwk::JwkSet,
};
use serde_json::Value;

use crate::{
    config::models::AuthConfig,
    core::error::{ProxyError, ProxyResult},
    ports::capability_gate::CapabilityGate,
};

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

enum VerificationKeys {
    /// No verification material: every caller is anonymous
    Disabled,
    Hmac(DecodingKey),
    Jwks(JwkSet),
}

pub struct JwtScopeGate {
    keys: VerificationKeys,
    issuer: Option<String>,
    audience: Option<String>,
    leeway_secs: u64,
}

impl JwtScopeGate {
    /// Build the gate, fetching the JWKS document once when only a URL is given.
    pub async fn from_config(config: &AuthConfig) -> Result<Self> {
        let keys = if let Some(jwks) = &config.jwks {
            VerificationKeys::Jwks(
                serde_json::from_str(jwks).wrap_err("auth.jwks is not a valid JWKS document")?,
            )
        } else if let Some(url) = &config.jwks_url {
            VerificationKeys::Jwks(fetch_jwks(url).await?)
        } else if let Some(secret) = &config.hmac_secret {
            VerificationKeys::Hmac(DecodingKey::from_secret(secret.as_bytes()))
        } else {
            tracing::warn!("No caller token verification configured; protected datasets are unreachable");
            VerificationKeys::Disabled
        };

        Ok(Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            leeway_secs: config.leeway_secs,
        })
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(std::slice::from_ref(issuer));
        }
        match &self.audience {
            Some(audience) => validation.set_audience(std::slice::from_ref(audience)),
            None => validation.validate_aud = false,
        }
        validation.leeway = self.leeway_secs;
        validation
    }

    fn verify(&self, token: &str) -> ProxyResult<Option<Value>> {
        let header =
            decode_header(token).map_err(|e| ProxyError::Unauthorized(format!("bad header: {e}")))?;

        let key = match &self.keys {
            VerificationKeys::Disabled => return Ok(None),
            VerificationKeys::Hmac(key) => {
                if !HMAC_ALGORITHMS.contains(&header.alg) {
                    return Err(ProxyError::Unauthorized(format!(
                        "unexpected algorithm {:?}",
                        header.alg
                    )));
                }
                key.clone()
            }
            VerificationKeys::Jwks(jwks) => {
                let kid = header
                    .kid
                    .as_deref()
                    .ok_or_else(|| ProxyError::Unauthorized("token has no kid".to_string()))?;
                let jwk = jwks
                    .find(kid)
                    .ok_or_else(|| ProxyError::Unauthorized(format!("unknown kid '{kid}'")))?;
                DecodingKey::from_jwk(jwk)
                    .map_err(|e| ProxyError::Unauthorized(format!("unusable JWK: {e}")))?
            }
        };

        let decoded = decode::<Value>(token, &key, &self.validation(header.alg))
            .map_err(|e| ProxyError::Unauthorized(e.to_string()))?;
        Ok(Some(decoded.claims))
    }
}

async fn fetch_jwks(url: &str) -> Result<JwkSet> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .wrap_err("Failed to build JWKS HTTP client")?;
    let response = client
        .get(url)
        .send()
        .await
        .wrap_err_with(|| format!("Failed to fetch JWKS from {url}"))?;
    if !response.status().is_success() {
        return Err(eyre!("JWKS endpoint {url} returned {}", response.status()));
    }
    response
        .json::<JwkSet>()
        .await
        .wrap_err("JWKS endpoint returned an invalid document")
}

/// Bearer token from the `Authorization` header; `None` when absent.
fn bearer_token(headers: &HeaderMap) -> ProxyResult<Option<&str>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ProxyError::Unauthorized("non-ASCII Authorization header".to_string()))?
        .trim();

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ProxyError::Unauthorized("Authorization is not a bearer token".to_string()))?;
    Ok(Some(token))
}

/// Union of every scope-carrying claim.
pub fn scopes_from_claims(claims: &Value) -> BTreeSet<String> {
    let mut scopes = BTreeSet::new();
    let mut add = |value: &str| {
        let value = value.trim();
        if !value.is_empty() {
            scopes.insert(value.to_string());
        }
    };

    for claim in [claims.get("scopes"), claims.get("scp"), claims.pointer("/realm_access/roles")]
        .into_iter()
        .flatten()
    {
        match claim {
            Value::String(joined) => joined.split_whitespace().for_each(&mut add),
            Value::Array(items) => items.iter().filter_map(Value::as_str).for_each(&mut add),
            _ => {}
        }
    }
    scopes
}

#[async_trait]
impl CapabilityGate for JwtScopeGate {
    async fn token_scopes(&self, headers: &HeaderMap) -> ProxyResult<BTreeSet<String>> {
        let Some(token) = bearer_token(headers)? else {
            return Ok(BTreeSet::new());
        };
        Ok(self
            .verify(token)?
            .map(|claims| scopes_from_claims(&claims))
            .unwrap_or_default())
    }
}
