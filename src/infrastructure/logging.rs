//! Logging system initialization.
//!
//! Console logging through `tracing-subscriber`. The filter is assembled from
//! the logging section of the configuration; a `RUST_LOG` environment variable
//! wins over both when present.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::infrastructure::config::LoggingConfig;

/// Build the filter directive string from config ("info,sqlx=warn,...").
fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = vec![config.level.clone()];
    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();
    for (module, level) in modules {
        directives.push(format!("{module}={level}"));
    }
    directives.join(",")
}

/// Initialize the global tracing subscriber.
///
/// Errors if a subscriber is already installed, which only happens when called
/// twice; tests install their own subscribers and skip this.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(config)))
        .map_err(|e| anyhow!("Invalid log filter: {e}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_module_filters() {
        let mut config = LoggingConfig::default();
        config.level = "debug".to_string();
        config.module_filters.clear();
        config
            .module_filters
            .insert("sqlx".to_string(), "warn".to_string());

        assert_eq!(filter_directives(&config), "debug,sqlx=warn");
    }

    #[test]
    fn directives_are_stable_across_runs() {
        let config = LoggingConfig::default();
        assert_eq!(filter_directives(&config), filter_directives(&config));
    }
}
