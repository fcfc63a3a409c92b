use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::ledger::types::{AmountPolicy, ConsistencyPolicy};
use crate::metrics::MarketCapPolicy;
use crate::money::DEFAULT_PRECISION;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Per-trade `TRADE` target events
    pub enable_tracing: bool,
    /// Ledger store; the in-memory store is used when unset
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Pricing and ledger behaviour
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Significant digits for curve divisions (floored at 40)
    #[serde(default = "default_precision")]
    pub precision: u64,
    #[serde(default)]
    pub amount_policy: AmountPolicy,
    #[serde(default)]
    pub consistency_policy: ConsistencyPolicy,
    #[serde(default)]
    pub market_cap_policy: MarketCapPolicy,
    /// Rolling price-change window
    #[serde(default = "default_price_window_secs")]
    pub price_window_secs: u64,
    /// Pool snapshot cache TTL; 0 disables the cache
    #[serde(default = "default_snapshot_cache_ttl_secs")]
    pub snapshot_cache_ttl_secs: u64,
}

fn default_precision() -> u64 {
    DEFAULT_PRECISION
}

fn default_price_window_secs() -> u64 {
    24 * 60 * 60
}

fn default_snapshot_cache_ttl_secs() -> u64 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            amount_policy: AmountPolicy::default(),
            consistency_policy: ConsistencyPolicy::default(),
            market_cap_policy: MarketCapPolicy::default(),
            price_window_secs: default_price_window_secs(),
            snapshot_cache_ttl_secs: default_snapshot_cache_ttl_secs(),
        }
    }
}

impl EngineConfig {
    pub fn price_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.price_window_secs as i64)
    }
}

/// Downstream notification delivery
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NotifyConfig {
    pub queue_size: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            queue_size: 10_000,
            max_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl NotifyConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
