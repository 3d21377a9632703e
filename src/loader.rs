//! Configuration loading
//!
//! Layers, lowest priority first: embedded defaults, `config/local.toml`,
//! an explicit `--config` file, then `CLAWROUTE_*` environment variables.

use anyhow::{Context, Result};
use clawroute_core::RouterConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load and validate the router configuration
pub fn load_config(path: Option<&Path>) -> Result<RouterConfig> {
    build(path, environment())
}

/// `CLAWROUTE_REQUEST_TIMEOUT_MS`, `CLAWROUTE_HEALTH__WINDOW_SIZE`, ...
fn environment() -> Environment {
    // prefix_separator("_") keeps a single underscore after the prefix;
    // config-rs otherwise reuses "__" there.
    Environment::with_prefix("CLAWROUTE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn build(path: Option<&Path>, env: Environment) -> Result<RouterConfig> {
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/local").required(false));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config: RouterConfig = builder
        .add_source(env)
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Environment {
        environment().source(Some(config::Map::new()))
    }

    #[test]
    fn test_embedded_defaults_match_builtin_defaults() {
        let config = build(None, no_env()).unwrap();
        assert_eq!(config, RouterConfig::default());
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let mut vars = config::Map::new();
        vars.insert("CLAWROUTE_REQUEST_TIMEOUT_MS".to_string(), "5000".to_string());
        vars.insert("CLAWROUTE_HEALTH__WINDOW_SIZE".to_string(), "7".to_string());
        vars.insert("CLAWROUTE_LOGGING__DEBUG_ROUTE".to_string(), "true".to_string());

        let config = build(None, environment().source(Some(vars))).unwrap();
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.health.window_size, 7);
        assert!(config.logging.debug_route);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut vars = config::Map::new();
        vars.insert("CLAWROUTE_HEALTH__WINDOW_SIZE".to_string(), "0".to_string());

        assert!(build(None, environment().source(Some(vars))).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let missing = Path::new("/nonexistent/clawroute.toml");
        assert!(build(Some(missing), no_env()).is_err());
    }
}
