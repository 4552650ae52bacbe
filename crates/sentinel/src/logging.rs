//! Log output of the agent

use std::env;

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::EnvFilter;

/// Environment variable with log filter directives. When set, it takes
/// precedence over the configured level.
pub const ENV_KEY: &str = "SENTINEL_LOG";

/// The `[log]` section of the config
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directives, e.g. `info` or `info,sentinel::sync=debug`
    pub level: String,
    /// Colored output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// Parse filter directives
pub fn parse_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .wrap_err_with(|| format!("Invalid log filter {directives:?}"))
}

/// Install the global subscriber. Logs go to stderr so that command output
/// on stdout stays clean.
pub fn init(config: &LogConfig) -> Result<()> {
    let directives =
        env::var(ENV_KEY).unwrap_or_else(|_| config.level.clone());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(parse_filter(&directives)?)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("Failed to set the log subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter("info").is_ok());
        assert!(parse_filter("warn,sentinel::sync=debug").is_ok());
        assert!(parse_filter("sentinel=loud").is_err());
    }
}
