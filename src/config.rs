//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GatekeeperError, Result};

/// Prefix for environment overrides, e.g. `GATEKEEPER__LOGGING__LEVEL=debug`.
const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for Gatekeeper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Limits keyed by protected resource name
    #[serde(default)]
    pub limits: HashMap<String, LimitConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Limits for a single protected resource.
///
/// Non-positive limits are accepted and make matching admissions block
/// forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Build a limiter for this resource; when false the resource is unmetered
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum admissions per window
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: i64,

    /// Maximum summed cost per window
    #[serde(default = "default_cost_per_window")]
    pub cost_per_window: f64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,

    /// Pause added to each computed wait, in milliseconds
    #[serde(default = "default_retry_buffer_ms")]
    pub retry_buffer_ms: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_window: default_requests_per_window(),
            cost_per_window: default_cost_per_window(),
            window_secs: default_window_secs(),
            retry_buffer_ms: default_retry_buffer_ms(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_window() -> i64 {
    60
}

fn default_cost_per_window() -> f64 {
    60000.0
}

fn default_window_secs() -> f64 {
    60.0
}

fn default_retry_buffer_ms() -> u64 {
    100
}

impl LimitConfig {
    /// Check that the window is usable. Limits are not checked.
    pub fn validate(&self) -> Result<()> {
        self.window().map(|_| ())
    }

    /// The window as a `Duration`. Fails unless `window_secs` is positive and
    /// representable.
    pub fn window(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.window_secs) {
            Ok(window) if !window.is_zero() => Ok(window),
            _ => Err(GatekeeperError::Config(format!(
                "window_secs must be a positive number of representable size, got {}",
                self.window_secs
            ))),
        }
    }

    pub fn retry_buffer(&self) -> Duration {
        Duration::from_millis(self.retry_buffer_ms)
    }
}

impl GatekeeperConfig {
    /// Load configuration from a file, with `GATEKEEPER__*` environment
    /// variables layered on top.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let config: GatekeeperConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every configured limit.
    pub fn validate(&self) -> Result<()> {
        for (name, limit) in &self.limits {
            limit
                .validate()
                .map_err(|e| GatekeeperError::Config(format!("limit '{}': {}", name, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
logging:
  level: debug
  json: true
limits:
  openai:
    requests_per_window: 60
    cost_per_window: 60000
    window_secs: 30
    retry_buffer_ms: 250
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);

        let limit = &config.limits["openai"];
        assert_eq!(limit.requests_per_window, 60);
        assert_eq!(limit.cost_per_window, 60000.0);
        assert_eq!(limit.window().unwrap(), Duration::from_secs(30));
        assert_eq!(limit.retry_buffer(), Duration::from_millis(250));
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
limits:
  anthropic: {}
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);

        let limit = &config.limits["anthropic"];
        assert_eq!(limit.requests_per_window, 60);
        assert_eq!(limit.cost_per_window, 60000.0);
        assert_eq!(limit.window().unwrap(), Duration::from_secs(60));
        assert_eq!(limit.retry_buffer(), Duration::from_millis(100));
        assert!(limit.enabled);
    }

    #[test]
    fn test_disabled_limit() {
        let yaml = r#"
limits:
  openai:
    enabled: false
    requests_per_window: 10
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        assert!(!config.limits["openai"].enabled);
    }

    #[test]
    fn test_non_positive_limits_accepted() {
        let yaml = r#"
limits:
  closed:
    requests_per_window: 0
    cost_per_window: -1
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limits["closed"].requests_per_window, 0);
    }

    #[test]
    fn test_invalid_window_rejected() {
        for window in ["0", "-5", "1e20", ".nan", ".inf", "1e-12"] {
            let yaml = format!("limits:\n  bad:\n    window_secs: {}\n", window);
            let err = GatekeeperConfig::from_yaml(&yaml).unwrap_err();
            assert!(matches!(err, GatekeeperError::Config(_)), "{}", err);
            assert!(err.to_string().contains("'bad'"));
        }
    }

    #[test]
    fn test_malformed_yaml() {
        let err = GatekeeperConfig::from_yaml("limits: [unclosed").unwrap_err();
        assert!(matches!(err, GatekeeperError::Yaml(_)));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!(
            "gatekeeper-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "limits:\n  local:\n    requests_per_window: 7\n    window_secs: 2\n",
        )
        .unwrap();

        let config = GatekeeperConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let limit = &config.limits["local"];
        assert_eq!(limit.requests_per_window, 7);
        assert_eq!(limit.window().unwrap(), Duration::from_secs(2));
    }
}
