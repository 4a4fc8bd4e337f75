//! Named limiters, one per protected resource.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::gate::{AdmissionGate, Unmetered};
use super::limiter::RateLimiter;
use super::usage::UsageSnapshot;
use crate::config::GatekeeperConfig;
use crate::error::{GatekeeperError, Result};

/// Registry handing out the shared limiter for each named resource.
///
/// Resource names are case-insensitive and stored lowercase, matching the keys
/// produced by [`GatekeeperConfig::from_file`].
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl LimiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one limiter for every enabled entry in `config.limits`.
    ///
    /// Disabled entries get no limiter, so [`gate`](Self::gate) treats them as
    /// unmetered.
    pub fn from_config(config: &GatekeeperConfig) -> Result<Self> {
        let registry = Self::new();
        for (name, limit) in &config.limits {
            if !limit.enabled {
                info!(resource = %name, "Rate limiting disabled");
                continue;
            }
            debug!(resource = %name, "Registering rate limiter");
            registry.insert(name.clone(), RateLimiter::from_config(limit)?);
        }
        Ok(registry)
    }

    /// Register `limiter` under `name`, replacing any previous one.
    ///
    /// Callers already holding the previous limiter keep using it.
    pub fn insert(&self, name: impl Into<String>, limiter: RateLimiter) -> Arc<RateLimiter> {
        let limiter = Arc::new(limiter);
        self.limiters.insert(normalize(&name.into()), limiter.clone());
        limiter
    }

    /// Get the limiter for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(&normalize(name)).map(|entry| entry.value().clone())
    }

    /// Get the limiter for `name`, failing if none is registered.
    pub fn require(&self, name: &str) -> Result<Arc<RateLimiter>> {
        self.get(name)
            .ok_or_else(|| GatekeeperError::UnknownLimiter(name.to_string()))
    }

    /// Get the gate for `name`. Resources without a limiter are unmetered.
    pub fn gate(&self, name: &str) -> Arc<dyn AdmissionGate> {
        match self.get(name) {
            Some(limiter) => limiter,
            None => Arc::new(Unmetered),
        }
    }

    /// Snapshot the usage of every registered limiter.
    pub fn usage(&self) -> BTreeMap<String, UsageSnapshot> {
        self.limiters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().current_usage()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> GatekeeperConfig {
        let yaml = r#"
limits:
  openai:
    requests_per_window: 2
    cost_per_window: 1000
  local:
    requests_per_window: 100
    cost_per_window: 5
    window_secs: 1
"#;
        GatekeeperConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_registry_from_config() {
        let registry = LimiterRegistry::from_config(&test_config()).unwrap();

        assert_eq!(registry.len(), 2);
        let openai = registry.get("openai").unwrap();
        assert_eq!(openai.max_requests_per_window(), 2);
        assert_eq!(openai.window(), Duration::from_secs(60));

        let local = registry.get("local").unwrap();
        assert_eq!(local.max_cost_per_window(), 5.0);
        assert_eq!(local.window(), Duration::from_secs(1));
    }

    #[test]
    fn test_get_returns_shared_instance() {
        let registry = LimiterRegistry::from_config(&test_config()).unwrap();

        registry.get("openai").unwrap().admit_blocking(10.0);

        let usage = registry.get("openai").unwrap().current_usage();
        assert_eq!(usage.requests.current, 1);
        assert_eq!(usage.cost.current, 10.0);
    }

    #[test]
    fn test_require_unknown_limiter() {
        let registry = LimiterRegistry::new();

        assert!(registry.is_empty());
        assert!(matches!(
            registry.require("missing"),
            Err(GatekeeperError::UnknownLimiter(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_insert_replaces_limiter() {
        let registry = LimiterRegistry::new();

        let first = registry.insert("api", RateLimiter::new(1, 10.0));
        registry.insert("api", RateLimiter::new(5, 10.0));

        assert_eq!(registry.len(), 1);
        assert_eq!(first.max_requests_per_window(), 1);
        assert_eq!(registry.require("api").unwrap().max_requests_per_window(), 5);
    }

    #[test]
    fn test_usage_covers_every_limiter() {
        let registry = LimiterRegistry::from_config(&test_config()).unwrap();
        registry.get("local").unwrap().admit_blocking(3.0);

        let usage = registry.usage();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage["local"].cost.current, 3.0);
        assert_eq!(usage["openai"].requests.current, 0);
    }

    #[tokio::test]
    async fn test_disabled_limit_is_unmetered() {
        let yaml = r#"
limits:
  openai:
    enabled: false
    requests_per_window: 1
  local:
    requests_per_window: 1
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        let registry = LimiterRegistry::from_config(&config).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("openai").is_none());
        assert!(registry.get("local").is_some());

        // A one-request budget would block the second call if it were metered.
        let gate = registry.gate("openai");
        for _ in 0..5 {
            tokio::time::timeout(Duration::from_millis(50), gate.admit(1.0))
                .await
                .expect("disabled limit should not wait");
        }
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let yaml = r#"
limits:
  OpenAI:
    requests_per_window: 3
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        let registry = LimiterRegistry::from_config(&config).unwrap();

        assert_eq!(registry.get("openai").unwrap().max_requests_per_window(), 3);
        assert_eq!(registry.get("OPENAI").unwrap().max_requests_per_window(), 3);
        assert!(registry.usage().contains_key("openai"));

        registry.insert("Local", RateLimiter::new(2, 10.0));
        assert!(registry.require("local").is_ok());
    }

    #[tokio::test]
    async fn test_gate_falls_back_to_unmetered() {
        let registry = LimiterRegistry::from_config(&test_config()).unwrap();

        let gate = registry.gate("unconfigured");
        for _ in 0..10 {
            gate.admit(1.0).await;
        }

        registry.gate("openai").admit(1.0).await;
        assert_eq!(registry.get("openai").unwrap().current_usage().requests.current, 1);
    }
}
