use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix of environment variables overriding file values, e.g.
/// `DATASELECT__SEARCH__BASE_URL`.
pub const ENV_PREFIX: &str = "DATASELECT";

/// Load configuration from an optional file layered under the environment.
/// Supports multiple formats: YAML, JSON, TOML, etc. A file that is named
/// but missing is an error.
pub fn load_config(config_path: Option<&str>) -> Result<ServerConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        builder = builder.add_source(File::new(
            path.to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?,
            file_format(path),
        ));
    }

    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("Failed to build config from {config_path:?}"))?;

    let server_config: ServerConfig = settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {config_path:?}"))?;

    Ok(server_config)
}

/// Determine file format based on extension
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}
