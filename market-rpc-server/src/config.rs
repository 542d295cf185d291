use std::time::Duration;
use trading_core::UpsertPolicy;
use trading_data_services::FeedsConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Period of `market.update` pushes
    pub broadcast_interval: Duration,
    pub upsert_policy: UpsertPolicy,
    /// Client-wide ceiling for the shared HTTP transport; pollers apply
    /// their own shorter timeouts per request
    pub http_timeout: Duration,
    pub feeds: FeedsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7879,
            broadcast_interval: Duration::from_millis(700),
            upsert_policy: UpsertPolicy::default(),
            http_timeout: Duration::from_secs(10),
            feeds: FeedsConfig::default(),
        }
    }
}
