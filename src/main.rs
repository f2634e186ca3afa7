use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use dataselect_proxy::{
    adapters::{HttpClientAdapter, HttpHandler, JwtScopeGate, token_source_from_config},
    config::{ServerConfig, ServerConfigValidator, load_config},
    metrics,
    ports::{capability_gate::CapabilityGate, http_client::HttpClient},
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file; environment variables (`DATASELECT__*`) override it
    #[clap(short, long)]
    config: Option<String>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration and exit
    Validate {
        #[clap(short, long)]
        config: Option<String>,
    },
    /// Write a starter configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the proxy server (default)
    Serve {
        #[clap(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(config.or(args.config)),
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(config.or(args.config)).await,
        None => serve(args.config).await,
    }
}

async fn serve(config_path: Option<String>) -> Result<()> {
    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        eprintln!("CryptoProvider::install_default for aws-lc-rs reported an error: {e:?}");
    }

    let config = load_config(config_path.as_deref())
        .with_context(|| format!("Failed to load configuration ({config_path:?})"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    metrics::init_metrics().map_err(|e| eyre!("Failed to initialize metrics: {}", e))?;

    ServerConfigValidator::validate(&config).context("Configuration is invalid")?;

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);
    let tokens =
        token_source_from_config(&config.credentials).context("Failed to create token source")?;
    let gate: Arc<dyn CapabilityGate> = Arc::new(
        JwtScopeGate::from_config(&config.auth)
            .await
            .context("Failed to set up caller token verification")?,
    );

    let handler = Arc::new(HttpHandler::new(&config, http_client, tokens, gate)?);
    let app = handler.router(&config.url_prefix);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        listen_addr = %addr,
        url_prefix = %config.url_prefix,
        search_backend = %config.search.base_url,
        export_backend = %config.export.base_url,
        "Dataselect proxy listening"
    );

    let graceful_shutdown = GracefulShutdown::new();
    let signal_handler = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let shutdown_token = graceful_shutdown.token();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => {
            result.context("Server error")?;
        }
        _ = graceful_shutdown.wait_for_shutdown() => {
            tracing::info!("Shutdown signal received, draining in-flight requests");
            // Long exports must not hold the process forever
            if tokio::time::timeout(graceful_shutdown.drain_timeout(), &mut server).await.is_err() {
                tracing::warn!(
                    "In-flight requests still running after {:?}, exiting",
                    graceful_shutdown.drain_timeout()
                );
            }
        }
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration and exit
fn validate_config_command(config_path: Option<String>) -> Result<()> {
    if let Some(path) = &config_path {
        println!("🔍 Validating configuration file: {path}");
        if !Path::new(path).exists() {
            eprintln!("❌ Error: Configuration file '{path}' not found");
            std::process::exit(1);
        }
    } else {
        println!("🔍 Validating configuration from environment");
    }

    let config: ServerConfig = match load_config(config_path.as_deref()) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • URL Prefix: {}", config.url_prefix);
            println!("   • Search Backend: {}", config.search.base_url);
            println!("   • Export Backend: {}", config.export.base_url);
            println!(
                "   • Datasets: {}",
                config
                    .datasets
                    .iter()
                    .map(|d| d.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure both backend URLs start with http:// or https://");
            println!("   • Verify listen address format (e.g., '0.0.0.0:8000')");
            println!("   • Dataset facets may not be named sort, page or export");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Dataselect proxy configuration
# Every value can be overridden with DATASELECT__<SECTION>__<KEY>,
# e.g. DATASELECT__SEARCH__BASE_URL.

listen_addr = "0.0.0.0:8000"
url_prefix = "/dataselectie"

[search]
base_url = "https://example.search.windows.net/indexes"
api_version = "2025-08-01-preview"
page_size = 100

[export]
base_url = "https://api.data.amsterdam.nl"

# Backend token for the search service
[credentials]
type = "managed_identity"
# type = "static"
# token = "..."

# Caller token verification for protected datasets
[auth]
# jwks_url = "https://login.example/realms/data/protocol/openid-connect/certs"
# issuer = "https://login.example/realms/data"

[logging]
level = "info"
json = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'dataselect-proxy serve --config {config_path}' to start the server");
    Ok(())
}
