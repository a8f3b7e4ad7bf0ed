use std::time::Duration;

use serde::Deserialize;

use crate::backbone::Subscription;
use crate::topics;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub redis: RedisConfig,
    pub hub: HubConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Language assumed for clients that do not send one
    #[serde(default = "default_language")]
    pub default_language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Publisher logs instead of publishing; no backbone is contacted
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default = "default_language")]
    pub fallback_language: String,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Capacity of the hub loop input queue (backpressure on the bridge)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Directory of `<language>.json` message catalogs
    #[serde(default)]
    pub locales_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "topics::default_global_topics")]
    pub topics: Vec<String>,
    #[serde(default = "topics::default_recipient_patterns")]
    pub patterns: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_language() -> String {
    "en".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_write_timeout_ms() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    1024
}

impl Config {
    /// Load from `APP_*`, `REDIS_*`, `HUB_*` and `BRIDGE_*` environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        Ok(Config {
            app: envy::prefixed("APP_").from_env()?,
            redis: envy::prefixed("REDIS_").from_env()?,
            hub: envy::prefixed("HUB_").from_env()?,
            bridge: envy::prefixed("BRIDGE_").from_env()?,
        })
    }
}

impl HubConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            fallback_language: default_language(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            write_timeout_ms: default_write_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            locales_dir: None,
        }
    }
}

impl BridgeConfig {
    pub fn subscription(&self) -> Subscription {
        Subscription::new(self.topics.clone(), self.patterns.clone())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            topics: topics::default_global_topics(),
            patterns: topics::default_recipient_patterns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_config_defaults() {
        let config = HubConfig::default();
        assert!(!config.test_mode);
        assert_eq!(config.fallback_language, "en");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(config.write_timeout(), Duration::from_millis(5000));
        assert_eq!(config.queue_capacity, 1024);
    }

    #[test]
    fn test_hub_config_from_vars() {
        let vars = vec![
            ("HUB_TEST_MODE".to_string(), "true".to_string()),
            ("HUB_FALLBACK_LANGUAGE".to_string(), "es".to_string()),
            ("HUB_SHUTDOWN_TIMEOUT_SECS".to_string(), "3".to_string()),
            ("HUB_LOCALES_DIR".to_string(), "/etc/locales".to_string()),
        ];
        let config: HubConfig = envy::prefixed("HUB_").from_iter(vars).unwrap();

        assert!(config.test_mode);
        assert_eq!(config.fallback_language, "es");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(3));
        assert_eq!(config.write_timeout_ms, 5000);
        assert_eq!(config.locales_dir.as_deref(), Some("/etc/locales"));
    }

    #[test]
    fn test_bridge_config_lists() {
        let vars = vec![(
            "BRIDGE_TOPICS".to_string(),
            "breaking_news,system_alert".to_string(),
        )];
        let config: BridgeConfig = envy::prefixed("BRIDGE_").from_iter(vars).unwrap();

        assert_eq!(config.topics, vec!["breaking_news", "system_alert"]);
        assert_eq!(config.patterns, topics::default_recipient_patterns());

        let subscription = config.subscription();
        assert!(subscription.matches("system_alert"));
        assert!(!subscription.matches("live_stats"));
    }

    #[test]
    fn test_app_config_defaults() {
        let config: AppConfig = envy::prefixed("APP_")
            .from_iter(Vec::<(String, String)>::new())
            .unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.default_language, "en");
    }
}
