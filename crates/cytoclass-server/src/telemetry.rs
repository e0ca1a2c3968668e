//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level. Output is JSON lines or
//! human-readable text per [`LogFormat`].

use cytoclass_core::{LogFormat, ServiceConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the level filter
///
/// # Errors
/// When neither `RUST_LOG` nor `log_level` is a valid directive.
pub fn env_filter(log_level: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| anyhow::anyhow!("invalid LOG_LEVEL {log_level:?}: {e}")),
    }
}

/// Install the global subscriber
///
/// # Errors
/// When the filter is invalid or a subscriber is already installed.
pub fn init_tracing(config: &ServiceConfig) -> anyhow::Result<()> {
    let filter = env_filter(&config.log_level)?;
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter("info,cytoclass=debug").is_ok());
            assert!(env_filter("cytoclass=loud").is_err());
        }
    }
}
