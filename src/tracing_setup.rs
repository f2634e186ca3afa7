use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::LoggingConfig;

/// Build the filter: `RUST_LOG` wins over the configured level.
fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}")),
    }
}

/// Initialize structured logging from the logging section of the config.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = env_filter(&config.level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if config.json {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .wrap_err("Tracing subscriber already installed")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Tracing subscriber already installed")?;
    }

    tracing::info!(
        level = %config.level,
        json = config.json,
        "Dataselect proxy logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        // SAFETY: RUST_LOG is only ever removed by this test, never set
        unsafe { std::env::remove_var("RUST_LOG") };
        assert!(env_filter("dataselect_proxy=loud").is_err());
        assert!(env_filter("dataselect_proxy=debug,info").is_ok());
    }

    #[test]
    fn test_init_tracing_twice_fails_cleanly() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            json: true,
        };
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
