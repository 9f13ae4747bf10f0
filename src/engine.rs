//! The payment engine facade used by the API layer.
//!
//! Wires the network config provider, one chain client per network, the
//! verifier and the listener supervisor. Observed transfers come out of the
//! receiver returned by [`PaymentEngine::new`].

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use dashmap::DashMap;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::blockchain::units::MAX_DECIMALS;
use crate::blockchain::{ChainClient, ChainError, ChainResult, Network, RpcChainClient, Token};
use crate::config::{EngineConfig, NetworkConfig, NetworkConfigProvider, SettingsError, SettingsStore};
use crate::payments::recorder::RecorderError;
use crate::payments::subscription::SubscriptionSettings;
use crate::payments::supervisor::{parse_wallet, SubscriptionSupervisor};
use crate::payments::types::{
    EntityId, MonitorError, MonitoredEntity, StartAllSummary, StartOutcome, StopStatus, SubscriptionHandle,
    TransferExpectation, TransferObserved, VerificationResult,
};
use crate::payments::verifier::TransferVerifier;
use crate::resilience::RetryPolicy;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Builds chain clients from resolved network settings.
pub trait ChainConnector: Send + Sync {
    fn connect(&self, config: &NetworkConfig) -> ChainResult<Arc<dyn ChainClient>>;
}

/// Connects over JSON-RPC (and WebSocket when configured).
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcConnector;

impl ChainConnector for RpcConnector {
    fn connect(&self, config: &NetworkConfig) -> ChainResult<Arc<dyn ChainClient>> {
        Ok(Arc::new(RpcChainClient::new(config.clone())?))
    }
}

pub struct PaymentEngine {
    provider: Arc<NetworkConfigProvider>,
    settings: Arc<dyn SettingsStore>,
    connector: Arc<dyn ChainConnector>,
    /// Clients are rebuilt when the provider hands out a different snapshot.
    clients: DashMap<Network, (NetworkConfig, Arc<dyn ChainClient>)>,
    retry: RetryPolicy,
    monitor_network: Network,
    platform_wallet: Option<Address>,
    supervisor: Arc<SubscriptionSupervisor>,
}

impl PaymentEngine {
    /// Build the engine and the channel observed transfers are delivered on.
    ///
    /// Listeners are bound to the monitor network's endpoints as resolved here.
    pub async fn new(
        config: &EngineConfig,
        settings: Arc<dyn SettingsStore>,
        provider: Arc<NetworkConfigProvider>,
        connector: Arc<dyn ChainConnector>,
    ) -> EngineResult<(Self, mpsc::Receiver<TransferObserved>)> {
        let monitor = &config.monitor;
        let token = match monitor.token_address.parse::<Token>()? {
            Token::Erc20(contract) => contract,
            Token::Native => {
                return Err(EngineError::InvalidInput(
                    "monitored token must be an ERC-20 contract".to_string(),
                ))
            }
        };
        let platform_wallet = match monitor.platform_wallet.trim() {
            "" => None,
            raw => Some(parse_wallet(raw)?),
        };

        let network_config = provider.config(monitor.network).await;
        let client = connector.connect(&network_config)?;
        let clients = DashMap::new();
        clients.insert(monitor.network, (network_config, client.clone()));

        let (events_tx, events_rx) = mpsc::channel(monitor.event_buffer.max(1));
        let supervisor = SubscriptionSupervisor::new(
            client,
            token,
            monitor.token_decimals,
            SubscriptionSettings::from(monitor),
            events_tx,
        );

        info!(
            network = %monitor.network,
            token = %token,
            platform_wallet = ?platform_wallet,
            "Payment engine initialized"
        );

        let engine = Self {
            provider,
            settings,
            connector,
            clients,
            retry: RetryPolicy::from(&config.verification),
            monitor_network: monitor.network,
            platform_wallet,
            supervisor: Arc::new(supervisor),
        };
        Ok((engine, events_rx))
    }

    /// Verify a claimed payment.
    ///
    /// An unparseable `tx_hash` cannot exist on-chain and yields `NotFound`.
    pub async fn verify_payment(
        &self,
        network: Network,
        tx_hash: &str,
        expected_amount: Decimal,
        token_address: &str,
        decimals: u8,
        recipient: &str,
    ) -> EngineResult<VerificationResult> {
        let Ok(tx_hash) = tx_hash.trim().parse::<TxHash>() else {
            debug!(tx_hash, "Unparseable transaction hash");
            return Ok(VerificationResult::NotFound);
        };
        let token = token_address
            .parse::<Token>()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let recipient = recipient
            .trim()
            .parse::<Address>()
            .map_err(|_| EngineError::InvalidInput(format!("invalid recipient address '{recipient}'")))?;
        if decimals > MAX_DECIMALS {
            return Err(EngineError::InvalidInput(format!(
                "decimals must be at most {MAX_DECIMALS}"
            )));
        }
        if expected_amount.is_sign_negative() {
            return Err(EngineError::InvalidInput("expected amount must not be negative".to_string()));
        }

        self.verify(
            network,
            tx_hash,
            TransferExpectation {
                token,
                recipient,
                min_amount: expected_amount,
                decimals,
            },
        )
        .await
    }

    /// Verify that `tx_hash` pays the network's activation fee to the platform wallet.
    pub async fn verify_activation_fee(&self, network: Network, tx_hash: &str) -> EngineResult<VerificationResult> {
        let Ok(tx_hash) = tx_hash.trim().parse::<TxHash>() else {
            return Ok(VerificationResult::NotFound);
        };
        let fee = self.settings.network_fee(network).await?;
        self.verify(
            network,
            tx_hash,
            TransferExpectation {
                token: fee.token,
                recipient: fee.platform_wallet,
                min_amount: fee.amount,
                decimals: fee.decimals,
            },
        )
        .await
    }

    pub async fn verify(
        &self,
        network: Network,
        tx_hash: TxHash,
        expectation: TransferExpectation,
    ) -> EngineResult<VerificationResult> {
        let client = self.client_for(network).await?;
        let verifier = TransferVerifier::new(client, self.retry);
        Ok(verifier.verify(tx_hash, &expectation).await?)
    }

    pub async fn start_campaign_listener(&self, campaign_id: &str, wallet: &str) -> EngineResult<StartOutcome> {
        let entity_id = campaign_entity(campaign_id)?;
        let wallet = parse_wallet(wallet)?;
        self.ensure_monitoring().await?;
        Ok(self.supervisor.start_listener(entity_id, wallet))
    }

    /// Signal the campaign's listener to stop. Idempotent.
    pub fn stop_campaign_listener(&self, campaign_id: &str) -> StopStatus {
        self.supervisor
            .stop_listener(&EntityId::campaign(campaign_id.trim()))
    }

    /// Resume every active campaign. Invalid wallets are counted, not fatal.
    pub async fn start_all_campaign_listeners(&self, campaigns: &[MonitoredEntity]) -> EngineResult<StartAllSummary> {
        self.ensure_monitoring().await?;
        Ok(self.supervisor.start_all(campaigns))
    }

    pub fn campaign_listeners_status(&self) -> Vec<SubscriptionHandle> {
        self.supervisor
            .status()
            .into_iter()
            .filter(|h| matches!(h.entity_id, EntityId::Campaign(_)))
            .collect()
    }

    /// All listeners, the platform's included.
    pub fn listeners_status(&self) -> Vec<SubscriptionHandle> {
        self.supervisor.status()
    }

    /// Start watching the platform wallet. `None` when no platform wallet is configured.
    pub async fn start_platform_listener(&self) -> EngineResult<Option<StartOutcome>> {
        let Some(wallet) = self.platform_wallet else {
            info!("No platform wallet configured, platform listener not started");
            return Ok(None);
        };
        self.ensure_monitoring().await?;
        Ok(Some(self.supervisor.start_listener(EntityId::Platform, wallet)))
    }

    pub fn supervisor(&self) -> Arc<SubscriptionSupervisor> {
        self.supervisor.clone()
    }

    pub fn monitor_network(&self) -> Network {
        self.monitor_network
    }

    /// Stop every listener and wait for them to exit.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }

    async fn ensure_monitoring(&self) -> Result<(), MonitorError> {
        let config = self.provider.config(self.monitor_network).await;
        if !config.monitoring_enabled {
            return Err(MonitorError::MonitoringDisabled(self.monitor_network));
        }
        Ok(())
    }

    async fn client_for(&self, network: Network) -> EngineResult<Arc<dyn ChainClient>> {
        let config = self.provider.config(network).await;
        if let Some(cached) = self.clients.get(&network) {
            if cached.0 == config {
                return Ok(cached.1.clone());
            }
        }
        debug!(network = %network, "Connecting chain client");
        let client = self.connector.connect(&config)?;
        self.clients.insert(network, (config, client.clone()));
        Ok(client)
    }
}

fn campaign_entity(campaign_id: &str) -> EngineResult<EntityId> {
    let id = campaign_id.trim();
    if id.is_empty() {
        return Err(EngineError::InvalidInput("campaign id must not be empty".to_string()));
    }
    if id == "platform" {
        return Err(EngineError::InvalidInput("'platform' is a reserved id".to_string()));
    }
    Ok(EntityId::campaign(id))
}
