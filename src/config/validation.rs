#![allow(clippy::collapsible_if)]

use std::net::SocketAddr;

use eyre::Result;

use crate::{
    config::models::{AuthConfig, CredentialsConfig, ServerConfig},
    core::registry::DatasetRegistry,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid dataset table: {message}")]
    InvalidDatasets { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_url_prefix(&config.url_prefix) {
            errors.push(e);
        }

        if let Some(scheme) = &config.public_scheme {
            if scheme != "http" && scheme != "https" {
                errors.push(ValidationError::InvalidField {
                    field: "public_scheme".to_string(),
                    message: format!("Must be 'http' or 'https', got '{scheme}'"),
                });
            }
        }

        if let Some(host) = &config.public_host {
            if host.trim().is_empty()
                || host.contains(['/', '?', '#', '@'])
                || host.chars().any(char::is_whitespace)
            {
                errors.push(ValidationError::InvalidField {
                    field: "public_host".to_string(),
                    message: format!("Must be a bare host or host:port, got '{host}'"),
                });
            }
        }

        if let Err(e) = Self::validate_url(&config.search.base_url, "search.base_url") {
            errors.push(e);
        }
        if let Err(e) = Self::validate_url(&config.export.base_url, "export.base_url") {
            errors.push(e);
        }

        if config.search.page_size == 0 {
            errors.push(ValidationError::InvalidField {
                field: "search.page_size".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if config.search.facet_limit == 0 {
            errors.push(ValidationError::InvalidField {
                field: "search.facet_limit".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if config.search.api_version.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "search.api_version".to_string(),
            });
        }
        if config.search.timeout_secs == 0 || config.export.timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "timeout_secs".to_string(),
                message: "Backend timeouts must be greater than 0".to_string(),
            });
        }

        if let Err(mut credential_errors) = Self::validate_credentials(&config.credentials) {
            errors.append(&mut credential_errors);
        }

        if let Err(e) = Self::validate_auth(&config.auth) {
            errors.push(e);
        }

        if config.datasets.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "datasets".to_string(),
            });
        } else if let Err(e) = DatasetRegistry::from_configs(&config.datasets) {
            errors.push(ValidationError::InvalidDatasets {
                message: e.to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_url_prefix(prefix: &str) -> ValidationResult<()> {
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(ValidationError::InvalidField {
                field: "url_prefix".to_string(),
                message: format!(
                    "Must start with '/' and must not end with '/' (e.g. '/dataselectie'), got '{prefix}'"
                ),
            });
        }
        if prefix.contains('{') || prefix.contains('}') {
            return Err(ValidationError::InvalidField {
                field: "url_prefix".to_string(),
                message: "Must not contain path parameters".to_string(),
            });
        }
        Ok(())
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        if url_str.is_empty() {
            return Err(ValidationError::MissingField {
                field: context.to_string(),
            });
        }

        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                if url.query().is_some() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "Base URL must not carry a query string".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_credentials(config: &CredentialsConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        match config {
            CredentialsConfig::Static { token } => {
                if token.trim().is_empty() {
                    errors.push(ValidationError::MissingField {
                        field: "credentials.token".to_string(),
                    });
                }
            }
            CredentialsConfig::ClientCredentials {
                token_url,
                client_id,
                client_secret,
            } => {
                if let Err(e) = Self::validate_url(token_url, "credentials.token_url") {
                    errors.push(e);
                }
                if client_id.trim().is_empty() {
                    errors.push(ValidationError::MissingField {
                        field: "credentials.client_id".to_string(),
                    });
                }
                if client_secret.is_empty() {
                    errors.push(ValidationError::MissingField {
                        field: "credentials.client_secret".to_string(),
                    });
                }
            }
            CredentialsConfig::ManagedIdentity { endpoint, .. } => {
                if let Some(endpoint) = endpoint {
                    if let Err(e) = Self::validate_url(endpoint, "credentials.endpoint") {
                        errors.push(e);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_auth(config: &AuthConfig) -> ValidationResult<()> {
        if let Some(jwks_url) = &config.jwks_url {
            Self::validate_url(jwks_url, "auth.jwks_url")?;
        }
        if let Some(jwks) = &config.jwks {
            if serde_json::from_str::<jsonwebtoken::jwk::JwkSet>(jwks).is_err() {
                return Err(ValidationError::InvalidField {
                    field: "auth.jwks".to_string(),
                    message: "Not a valid JWKS document".to_string(),
                });
            }
        }
        if let Some(secret) = &config.hmac_secret {
            if secret.len() < 16 {
                return Err(ValidationError::InvalidField {
                    field: "auth.hmac_secret".to_string(),
                    message: "Must be at least 16 bytes".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
