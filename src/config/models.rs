//! Configuration data structures for the dataselect proxy.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and to
//! `DATASELECT__*` environment variables. They are serde‑friendly and include defaults
//! so that a minimal deployment only has to provide the two backend base URLs.
use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_url_prefix() -> String {
    "/dataselectie".to_string()
}

/// Search backend (OData style `docs/search` endpoint) settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SearchBackendConfig {
    /// Base URL of the search service, e.g. `https://<name>.search.windows.net/indexes`
    pub base_url: String,
    /// Value of the `api-version` query parameter
    pub api_version: String,
    /// Number of documents per page (`top`)
    pub page_size: u32,
    /// Facet bucket limit requested for every dataset facet
    pub facet_limit: u32,
    /// Audience / scope the backend token is requested for
    pub token_audience: String,
    /// Maximum wait for the response headers (seconds)
    pub timeout_secs: u64,
}

impl Default for SearchBackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_version: "2025-08-01-preview".to_string(),
            page_size: 100,
            facet_limit: 1400,
            token_audience: "https://search.azure.com/.default".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Export backend (CSV streaming REST API) settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ExportBackendConfig {
    /// Base URL of the export API; requests go to `{base_url}/v1/{export_path}`
    pub base_url: String,
    /// Maximum wait for the response headers (seconds). The body itself streams unbounded.
    pub timeout_secs: u64,
}

impl Default for ExportBackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 60,
        }
    }
}

/// Where the bearer token for the search backend comes from.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum CredentialsConfig {
    /// Fixed token, for local development against a test index
    Static { token: String },
    /// OAuth2 client credentials grant
    ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: String,
    },
    /// Azure instance metadata service (managed identity)
    ManagedIdentity {
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        CredentialsConfig::ManagedIdentity {
            client_id: None,
            endpoint: None,
        }
    }
}

/// Verification settings for caller tokens (scope gate).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Inline JWKS document
    pub jwks: Option<String>,
    /// JWKS URL, fetched once at startup
    pub jwks_url: Option<String>,
    /// Shared HS256 secret (development only)
    pub hmac_secret: Option<String>,
    /// Expected `iss` claim
    pub issuer: Option<String>,
    /// Expected `aud` claim
    pub audience: Option<String>,
    /// Allowed clock skew when checking `exp` / `nbf`
    pub leeway_secs: u64,
}

/// Logging output settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub level: String,
    /// Emit JSON lines instead of the pretty console format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// One logical dataset exposed under `{url_prefix}/{id}/search`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    pub id: String,
    pub index_name: String,
    pub export_path: String,
    #[serde(default)]
    pub facets: Vec<String>,
    #[serde(default)]
    pub boolean_fields: Vec<String>,
    #[serde(default)]
    pub required_scopes: Vec<String>,
}

impl DatasetConfig {
    fn new(id: &str, index_name: &str, export_path: &str) -> Self {
        Self {
            id: id.to_string(),
            index_name: index_name.to_string(),
            export_path: export_path.to_string(),
            facets: Vec::new(),
            boolean_fields: Vec::new(),
            required_scopes: Vec::new(),
        }
    }

    fn facets(mut self, facets: &[&str]) -> Self {
        self.facets = facets.iter().map(|f| f.to_string()).collect();
        self
    }

    fn boolean_fields(mut self, fields: &[&str]) -> Self {
        self.boolean_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    fn required_scopes(mut self, scopes: &[&str]) -> Self {
        self.required_scopes = scopes.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// The datasets served when the configuration does not list its own.
pub fn default_datasets() -> Vec<DatasetConfig> {
    vec![
        DatasetConfig::new(
            "bag",
            "benkagg_adresseerbareobjecten",
            "benkagg/adresseerbareobjecten",
        )
        .facets(&[
            "woonplaatsNaam",
            "gebiedenStadsdeelNaam",
            "gebiedenGgwgebiedNaam",
            "gebiedenWijkNaam",
            "gebiedenBuurtNaam",
            "openbareruimteNaam",
            "postcode",
        ]),
        DatasetConfig::new(
            "brk",
            "benkagg_brkbasisdataselectie",
            "benkagg/brkbasisdataselectie",
        )
        .facets(&[
            "grondeigenaar",
            "pandeigenaar",
            "appartementseigenaar",
            "subjectCategorie",
            "stadsdeelNaam",
            "ggwNaam",
            "wijkNaam",
            "buurtNaam",
        ])
        .boolean_fields(&["grondeigenaar", "pandeigenaar", "appartementseigenaar"])
        .required_scopes(&["BRK/RSN"]),
        DatasetConfig::new(
            "hr",
            "benkagg_handelsregisterkvk",
            "benkagg/handelsregisterkvk",
        )
        .facets(&[
            "bagOpenbareruimteNaam",
            "bagPostcode",
            "bijzondereRechtstoestandPersoon",
            "gebiedenBuurtNaam",
            "gebiedenGgwgebiedNaam",
            "gebiedenStadsdeelNaam",
            "gebiedenWijkNaam",
        ])
        .required_scopes(&["FP/MDW"]),
    ]
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Path prefix of the public API, e.g. `/dataselectie`
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    /// Scheme used when rebuilding the caller-facing URL; falls back to
    /// `X-Forwarded-Proto` and then `http`
    #[serde(default)]
    pub public_scheme: Option<String>,
    /// Host (optionally `host:port`) used when rebuilding the caller-facing
    /// URL; when unset the caller's `Host` header is used
    #[serde(default)]
    pub public_host: Option<String>,
    #[serde(default)]
    pub search: SearchBackendConfig,
    #[serde(default)]
    pub export: ExportBackendConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_datasets")]
    pub datasets: Vec<DatasetConfig>,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            url_prefix: default_url_prefix(),
            public_scheme: None,
            public_host: None,
            search: SearchBackendConfig::default(),
            export: ExportBackendConfig::default(),
            credentials: CredentialsConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
            datasets: default_datasets(),
        }
    }
}

/// Builder for ServerConfig, mostly used by tests and embedders.
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the public API path prefix
    pub fn url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.url_prefix = prefix.into();
        self
    }

    /// Set the search backend base URL
    pub fn search_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.search.base_url = url.into();
        self
    }

    /// Set the export backend base URL
    pub fn export_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.export.base_url = url.into();
        self
    }

    /// Use a fixed backend token
    pub fn static_token(mut self, token: impl Into<String>) -> Self {
        self.config.credentials = CredentialsConfig::Static {
            token: token.into(),
        };
        self
    }

    /// Verify caller tokens with a shared HS256 secret
    pub fn hmac_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.hmac_secret = Some(secret.into());
        self
    }

    /// Replace the dataset table
    pub fn datasets(mut self, datasets: Vec<DatasetConfig>) -> Self {
        self.config.datasets = datasets;
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        if self.config.search.base_url.is_empty() {
            return Err("search.base_url is required".to_string());
        }
        if self.config.export.base_url.is_empty() {
            return Err("export.base_url is required".to_string());
        }
        Ok(self.config)
    }
}
