use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Extra attempts per page before the profile's cycle is abandoned.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_uri")]
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_store_uri(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollingConfig {
    #[serde(default)]
    pub gas_enabled: bool,
    /// Seconds between cycles; a single cycle is run when absent.
    pub interval_secs: Option<u64>,
    /// Explicit profile ids, overriding `gas_enabled`.
    pub profiles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub meter: MeterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_page_concurrency() -> usize {
    1
}

fn default_store_uri() -> String {
    "sqlite://youless.db".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("YOULESS_CONFIG").unwrap_or_else(|_| "youless-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.polling.interval_secs == Some(0) {
            anyhow::bail!("polling.interval_secs must be positive");
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [meter]
            base_url = "http://192.168.1.14"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.meter.request_timeout_ms, 10_000);
        assert_eq!(cfg.meter.max_retries, 0);
        assert_eq!(cfg.meter.page_concurrency, 1);
        assert_eq!(cfg.store.uri, "sqlite://youless.db");
        assert!(!cfg.polling.gas_enabled);
        assert!(cfg.polling.interval_secs.is_none());
        assert!(cfg.polling.profiles.is_none());
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn full_config_parses() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [meter]
            base_url = "http://youless.local"
            request_timeout_ms = 2500
            max_retries = 3
            retry_backoff_ms = 200
            page_concurrency = 4

            [store]
            uri = "sqlite:///var/lib/youless/youless.db"
            max_connections = 2
            busy_timeout_ms = 1000

            [polling]
            gas_enabled = true
            interval_secs = 600
            profiles = ["electricity-minute", "gas-day"]

            [metrics]
            bind_addr = "0.0.0.0:9000"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.meter.max_retries, 3);
        assert_eq!(cfg.meter.page_concurrency, 4);
        assert_eq!(cfg.store.max_connections, 2);
        assert!(cfg.polling.gas_enabled);
        assert_eq!(cfg.polling.interval_secs, Some(600));
        assert_eq!(
            cfg.polling.profiles.as_deref(),
            Some(&["electricity-minute".to_string(), "gas-day".to_string()][..])
        );
        assert_eq!(cfg.metrics.unwrap().bind_addr, "0.0.0.0:9000");
    }

    #[test]
    fn missing_meter_section_is_an_error() {
        assert!(AppConfig::from_toml_str("[store]\nuri = \"sqlite::memory:\"\n").is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [meter]
            base_url = "http://youless.local"
            [polling]
            interval_secs = 0
            "#,
        );
        assert!(res.is_err());
    }
}
