//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine binary.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::blockchain::Network;

/// Root configuration for the payment monitor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Wallet monitoring settings.
    pub monitor: MonitorConfig,

    /// Retry policy for payment verification.
    pub verification: VerificationConfig,

    /// Where network endpoints come from and how long they are cached.
    pub settings: SettingsConfig,

    /// Donation ledger persistence.
    pub ledger: LedgerConfig,

    /// Campaign wallets to resume monitoring at startup.
    pub campaigns: Vec<CampaignConfig>,

    /// Operator API.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Wallet monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Network the listeners watch.
    pub network: Network,

    /// Token contract whose Transfer events count as donations.
    pub token_address: String,

    /// Decimals of `token_address`.
    pub token_decimals: u8,

    /// Platform wallet receiving activation fees. Empty disables the platform listener.
    pub platform_wallet: String,

    /// Block polling interval when no WebSocket endpoint is usable.
    pub poll_interval_ms: u64,

    /// First delay before reconnecting a dropped subscription.
    pub reconnect_backoff_ms: u64,

    /// Upper bound for the reconnect delay.
    pub max_reconnect_backoff_ms: u64,

    /// Largest block span requested in one `eth_getLogs` call.
    pub max_block_range: u64,

    /// How far back a WebSocket subscription re-scans after reconnecting.
    pub reconcile_blocks: u64,

    /// Capacity of the observed-transfer channel.
    pub event_buffer: usize,

    /// Interval of the watchdog that restarts dead subscription tasks.
    pub watchdog_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            network: Network::Ethereum,
            // USDT on Ethereum mainnet
            token_address: "0xdAC17F958D2ee523a2206206994597C13D831ec7".to_string(),
            token_decimals: 6,
            platform_wallet: String::new(),
            poll_interval_ms: 12_000,
            reconnect_backoff_ms: 5_000,
            max_reconnect_backoff_ms: 60_000,
            max_block_range: 2_000,
            reconcile_blocks: 200,
            event_buffer: 1_024,
            watchdog_secs: 30,
        }
    }
}

/// Retry configuration for verification RPC calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Maximum number of attempts for a transient failure.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Freshness window of the network settings cache.
    pub cache_ttl_secs: u64,

    /// Flat key/value TOML file standing in for the settings table.
    pub settings_file: Option<String>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            settings_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON file the donation ledger is saved to on shutdown.
    pub persistence_path: Option<String>,
}

/// A campaign wallet known at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CampaignConfig {
    pub id: String,
    pub wallet: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Placeholder admin key; validation rejects it when the API is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
