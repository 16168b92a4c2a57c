//! Process configuration for the guardrail orchestration service.
//!
//! The binary is configured via a YAML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax, the same convention the
//! reference gateway uses for its own config loader. This is distinct from
//! the hot-reloadable [`policy`] document served under `/policy`.
//!
//! # Example
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8080
//! policy_path: "${POLICY_PATH}"
//! ```

mod limits;
mod observability;
pub mod policy;
mod server;

use std::path::Path;

pub use limits::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root process configuration.
///
/// All sections are optional with sensible defaults; a bare `{}` document is
/// a valid (if minimal) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging/tracing/metrics configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Resource limits independent of the guardrail policy (body size caps,
    /// request timeouts).
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Path to the initial policy document. If unset, the built-in safe
    /// default policy (§4.1) is used until the first `PUT`/`POST /policy`.
    #[serde(default)]
    pub policy_path: Option<String>,

    /// Upstream model-inference endpoint used by the proxy (§4.6).
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// High-water mark of concurrently in-flight requests before `503`
    /// backpressure kicks in (§5).
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Use case assumed when a request omits `use_case`.
    #[serde(default = "default_use_case")]
    pub default_use_case: crate::checkers::UseCase,
}

fn default_upstream_url() -> String {
    "http://localhost:11434/v1/chat/completions".to_string()
}

fn default_max_in_flight() -> usize {
    512
}

fn default_use_case() -> crate::checkers::UseCase {
    crate::checkers::UseCase::Chat
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
            limits: LimitsConfig::default(),
            policy_path: None,
            upstream_url: default_upstream_url(),
            max_in_flight: default_max_in_flight(),
            default_use_case: default_use_case(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, expanding `${VAR}` references
    /// against the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::Validation(
                "max_in_flight must be greater than zero".into(),
            ));
        }
        if self.upstream_url.is_empty() {
            return Err(ConfigError::Validation("upstream_url must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`. Skips
/// references that appear after a `#` comment marker on the same line.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let match_start = cap.get(0).unwrap().start();
            if let Some(pos) = comment_pos {
                if match_start >= pos {
                    continue;
                }
            }

            line_result.push_str(&line[last_end..match_start]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = cap.get(0).unwrap().end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_str("{}").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.max_in_flight, 512);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Config::from_str("not_a_real_field: true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn expands_env_var() {
        std::env::set_var("GUARDRAIL_GATE_TEST_UPSTREAM", "http://upstream.internal/v1");
        let config =
            Config::from_str("upstream_url: \"${GUARDRAIL_GATE_TEST_UPSTREAM}\"").unwrap();
        assert_eq!(config.upstream_url, "http://upstream.internal/v1");
        std::env::remove_var("GUARDRAIL_GATE_TEST_UPSTREAM");
    }

    #[test]
    fn missing_env_var_is_an_error() {
        let err = Config::from_str("upstream_url: \"${GUARDRAIL_GATE_DOES_NOT_EXIST}\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound(_)));
    }

    #[test]
    fn rejects_zero_max_in_flight() {
        let err = Config::from_str("max_in_flight: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
