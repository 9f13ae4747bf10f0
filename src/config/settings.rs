//! The settings collaborator: where blockchain endpoints and network fees come from.

use std::collections::HashMap;
use std::path::PathBuf;

use alloy::primitives::Address;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::{Network, Token};

#[derive(Debug, Error)]
pub enum SettingsError {
    /// The backing store could not be reached.
    #[error("settings store unavailable: {0}")]
    Unavailable(String),

    #[error("no {0} configured")]
    NotFound(String),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Activation fee a network charges, and where it must be paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFee {
    pub token: Token,
    pub decimals: u8,
    pub amount: Decimal,
    pub platform_wallet: Address,
}

/// Read access to the settings table owned by the persistence layer.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Flat `key -> value` blockchain settings, e.g. `ethereum_rpc_url`.
    async fn blockchain_settings(&self) -> Result<HashMap<String, String>, SettingsError>;

    async fn network_fee(&self, network: Network) -> Result<NetworkFee, SettingsError>;
}

/// Store with no rows; every lookup falls through to environment and defaults.
#[derive(Debug, Default, Clone)]
pub struct EmptySettingsStore;

#[async_trait]
impl SettingsStore for EmptySettingsStore {
    async fn blockchain_settings(&self) -> Result<HashMap<String, String>, SettingsError> {
        Ok(HashMap::new())
    }

    async fn network_fee(&self, network: Network) -> Result<NetworkFee, SettingsError> {
        Err(SettingsError::NotFound(format!("network fee for {network}")))
    }
}

/// Settings read from a TOML file on every refresh.
///
/// ```toml
/// ethereum_rpc_url = "https://..."
/// rpc_timeout_ms = 8000
///
/// [fees.ethereum]
/// token = "0xdAC17F958D2ee523a2206206994597C13D831ec7"
/// decimals = 6
/// amount = "50"
/// platform_wallet = "0x..."
/// ```
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    fees: HashMap<Network, NetworkFee>,
    #[serde(flatten)]
    values: toml::Table,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<SettingsFile, SettingsError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SettingsError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        toml::from_str(&content).map_err(|e| SettingsError::Invalid(e.to_string()))
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn blockchain_settings(&self) -> Result<HashMap<String, String>, SettingsError> {
        let file = self.read().await?;
        Ok(file
            .values
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect())
    }

    async fn network_fee(&self, network: Network) -> Result<NetworkFee, SettingsError> {
        let mut file = self.read().await?;
        file.fees
            .remove(&network)
            .ok_or_else(|| SettingsError::NotFound(format!("network fee for {network}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_file_store() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
ethereum_rpc_url = "https://rpc.example"
rpc_timeout_ms = 8000
blockchain_monitoring_enabled = false

[fees.bsc]
token = "0x55d398326f99059fF775485246999027B3197955"
decimals = 18
amount = "25"
platform_wallet = "0x2222222222222222222222222222222222222222"
"#
        )
        .unwrap();

        let store = FileSettingsStore::new(file.path());
        let settings = store.blockchain_settings().await.unwrap();
        assert_eq!(settings["ethereum_rpc_url"], "https://rpc.example");
        assert_eq!(settings["rpc_timeout_ms"], "8000");
        assert_eq!(settings["blockchain_monitoring_enabled"], "false");
        assert!(!settings.contains_key("fees"));

        let fee = store.network_fee(Network::Bsc).await.unwrap();
        assert_eq!(fee.decimals, 18);
        assert_eq!(fee.amount, Decimal::from_str("25").unwrap());
        assert!(matches!(
            store.network_fee(Network::Polygon).await,
            Err(SettingsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let store = FileSettingsStore::new("/no/such/settings.toml");
        assert!(matches!(
            store.blockchain_settings().await,
            Err(SettingsError::Unavailable(_))
        ));
    }
}
