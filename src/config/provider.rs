//! Network endpoint resolution with a time-boxed cache.
//!
//! # Resolution order (per key)
//! ```text
//! non-empty settings store value
//!     → environment variable (upper-cased key, e.g. ETHEREUM_RPC_URL)
//!     → hardcoded literal
//! ```
//!
//! # Design Decisions
//! - The whole snapshot is rebuilt and swapped at once, never patched per field
//! - A store failure reuses the last snapshot (or the defaults) and restamps it, so the
//!   store is asked at most once per freshness window
//! - `config()` cannot fail; the worst case is the hardcoded defaults

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use url::Url;

use crate::blockchain::{ChainId, Network};
use crate::config::settings::SettingsStore;

/// Default freshness window of the settings cache.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Upper bound on a single settings store round trip.
const STORE_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

const KEY_TIMEOUT: &str = "rpc_timeout_ms";
const KEY_MONITORING: &str = "blockchain_monitoring_enabled";

const ETHEREUM_RPC: &str = "https://ethereum-rpc.publicnode.com";
const BSC_RPC: &str = "https://bsc-dataseed.binance.org";
const POLYGON_RPC: &str = "https://polygon-rpc.com";

/// Last-resort values, used when neither the store nor the environment has the key.
const HARDCODED: &[(&str, &str)] = &[
    ("ethereum_rpc_url", ETHEREUM_RPC),
    ("ethereum_ws_url", "wss://ethereum-rpc.publicnode.com"),
    ("bsc_rpc_url", BSC_RPC),
    ("bsc_ws_url", "wss://bsc-rpc.publicnode.com"),
    ("polygon_rpc_url", POLYGON_RPC),
    ("polygon_ws_url", "wss://polygon-bor-rpc.publicnode.com"),
    (KEY_TIMEOUT, "10000"),
    (KEY_MONITORING, "true"),
];

/// Resolved connection settings for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: Network,
    pub chain_id: ChainId,
    pub http_endpoint: Url,
    /// Failover JSON-RPC endpoint.
    pub backup_endpoint: Option<Url>,
    /// Absent means listeners poll over HTTP.
    pub ws_endpoint: Option<Url>,
    pub request_timeout: Duration,
    pub monitoring_enabled: bool,
}

impl NetworkConfig {
    /// Configuration built purely from the hardcoded literals.
    pub fn hardcoded(network: Network) -> Self {
        build_network(network, &resolve_keys(&HashMap::new(), &HashMap::new()))
    }
}

struct CachedSettings {
    networks: HashMap<Network, NetworkConfig>,
    fetched_at: Instant,
}

impl CachedSettings {
    fn get(&self, network: Network) -> NetworkConfig {
        self.networks
            .get(&network)
            .cloned()
            .unwrap_or_else(|| NetworkConfig::hardcoded(network))
    }
}

/// Resolves [`NetworkConfig`]s from a [`SettingsStore`], caching the result.
pub struct NetworkConfigProvider {
    store: Arc<dyn SettingsStore>,
    fallbacks: HashMap<String, String>,
    ttl: Duration,
    cache: ArcSwapOption<CachedSettings>,
    refresh: Mutex<()>,
}

impl NetworkConfigProvider {
    /// Create a provider whose fallbacks come from the process environment.
    pub fn new(store: Arc<dyn SettingsStore>, ttl: Duration) -> Self {
        let fallbacks = known_keys()
            .into_iter()
            .filter_map(|key| {
                std::env::var(key.to_ascii_uppercase())
                    .ok()
                    .map(|value| (key, value))
            })
            .collect();
        Self::with_fallbacks(store, ttl, fallbacks)
    }

    /// Create a provider with explicit fallback values (keyed like the store).
    pub fn with_fallbacks(
        store: Arc<dyn SettingsStore>,
        ttl: Duration,
        fallbacks: HashMap<String, String>,
    ) -> Self {
        Self {
            store,
            fallbacks,
            ttl,
            cache: ArcSwapOption::const_empty(),
            refresh: Mutex::new(()),
        }
    }

    /// Current configuration for `network`. Never fails.
    pub async fn config(&self, network: Network) -> NetworkConfig {
        if let Some(cached) = self.fresh() {
            return cached.get(network);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(cached) = self.fresh() {
            return cached.get(network);
        }

        let networks = match tokio::time::timeout(STORE_TIMEOUT, self.store.blockchain_settings()).await {
            Ok(Ok(values)) => {
                let resolved = resolve_keys(&values, &self.fallbacks);
                tracing::debug!(keys = values.len(), "Reloaded blockchain settings");
                build_all(&resolved)
            }
            Ok(Err(e)) => self.degraded(&e.to_string()),
            Err(_) => self.degraded("settings store timed out"),
        };

        let cached = Arc::new(CachedSettings {
            networks,
            fetched_at: Instant::now(),
        });
        self.cache.store(Some(cached.clone()));
        cached.get(network)
    }

    /// Drop the cached snapshot so the next call reloads.
    pub fn invalidate(&self) {
        self.cache.store(None);
    }

    fn fresh(&self) -> Option<Arc<CachedSettings>> {
        self.cache
            .load_full()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
    }

    fn degraded(&self, reason: &str) -> HashMap<Network, NetworkConfig> {
        match self.cache.load_full() {
            Some(previous) => {
                tracing::warn!(error = %reason, "Settings reload failed, keeping previous snapshot");
                previous.networks.clone()
            }
            None => {
                tracing::warn!(error = %reason, "Settings reload failed, using fallback endpoints");
                build_all(&resolve_keys(&HashMap::new(), &self.fallbacks))
            }
        }
    }
}

fn known_keys() -> Vec<String> {
    let mut keys: Vec<String> = Network::ALL
        .iter()
        .flat_map(|n| {
            ["rpc_url", "rpc_backup", "ws_url"]
                .into_iter()
                .map(move |suffix| format!("{}_{}", n.as_str(), suffix))
        })
        .collect();
    keys.push(KEY_TIMEOUT.to_string());
    keys.push(KEY_MONITORING.to_string());
    keys
}

fn non_empty(map: &HashMap<String, String>, key: &str) -> Option<String> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Merge store values over fallbacks over hardcoded literals.
fn resolve_keys(
    store: &HashMap<String, String>,
    fallbacks: &HashMap<String, String>,
) -> HashMap<String, String> {
    known_keys()
        .into_iter()
        .filter_map(|key| {
            let value = non_empty(store, &key)
                .or_else(|| non_empty(fallbacks, &key))
                .or_else(|| {
                    HARDCODED
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map(|(_, v)| v.to_string())
                })?;
            Some((key, value))
        })
        .collect()
}

fn build_all(resolved: &HashMap<String, String>) -> HashMap<Network, NetworkConfig> {
    Network::ALL
        .iter()
        .map(|network| (*network, build_network(*network, resolved)))
        .collect()
}

fn build_network(network: Network, resolved: &HashMap<String, String>) -> NetworkConfig {
    let key = |suffix: &str| format!("{}_{}", network.as_str(), suffix);
    let parse_url = |name: String| -> Option<Url> {
        let raw = resolved.get(&name)?;
        match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(key = %name, error = %e, "Ignoring unparseable endpoint");
                None
            }
        }
    };

    let http_endpoint = parse_url(key("rpc_url")).unwrap_or_else(|| hardcoded_url(network));
    let backup_endpoint = parse_url(key("rpc_backup"));
    let ws_endpoint = parse_url(key("ws_url"));

    let timeout_ms = resolved
        .get(KEY_TIMEOUT)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_TIMEOUT_MS);
    let monitoring_enabled = resolved
        .get(KEY_MONITORING)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(true);

    NetworkConfig {
        network,
        chain_id: network.chain_id(),
        http_endpoint,
        backup_endpoint,
        ws_endpoint,
        request_timeout: Duration::from_millis(timeout_ms),
        monitoring_enabled,
    }
}

/// JSON-RPC endpoints of last resort, parsed once from compile-time literals.
static FALLBACK_RPC: LazyLock<[Url; 3]> = LazyLock::new(|| {
    [ETHEREUM_RPC, BSC_RPC, POLYGON_RPC].map(|literal| {
        Url::parse(literal).unwrap_or_else(|e| panic!("invalid fallback endpoint {literal}: {e}"))
    })
});

fn hardcoded_url(network: Network) -> Url {
    let index = match network {
        Network::Ethereum => 0,
        Network::Bsc => 1,
        Network::Polygon => 2,
    };
    FALLBACK_RPC[index].clone()
}
