//! Startup orchestration.
//!
//! # Responsibilities
//! - Pick the settings store and build the network config provider
//! - Construct the payment engine and the donation ledger
//! - Resume the platform and campaign listeners
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last, once the recorder can receive their events

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::{EmptySettingsStore, EngineConfig, FileSettingsStore, NetworkConfigProvider, SettingsStore};
use crate::engine::{EngineError, PaymentEngine, RpcConnector};
use crate::payments::ledger::DonationLedger;
use crate::payments::types::{MonitoredEntity, TransferObserved};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build payment engine: {0}")]
    Engine(#[from] EngineError),

    #[error("failed to load donation ledger: {0}")]
    Ledger(#[from] std::io::Error),
}

/// Everything `main` needs to run.
pub struct Services {
    pub engine: Arc<PaymentEngine>,
    pub ledger: Arc<DonationLedger>,
    pub events: mpsc::Receiver<TransferObserved>,
}

/// Build the engine and ledger from a validated configuration.
pub async fn bootstrap(config: &EngineConfig) -> Result<Services, StartupError> {
    let store: Arc<dyn SettingsStore> = match &config.settings.settings_file {
        Some(path) => {
            info!(path, "Reading blockchain settings from file");
            Arc::new(FileSettingsStore::new(path))
        }
        None => {
            warn!("No settings file configured, using environment and built-in endpoints");
            Arc::new(EmptySettingsStore)
        }
    };
    let provider = Arc::new(NetworkConfigProvider::new(
        store.clone(),
        Duration::from_secs(config.settings.cache_ttl_secs),
    ));

    let (engine, events) = PaymentEngine::new(config, store, provider, Arc::new(RpcConnector)).await?;

    let ledger = match &config.ledger.persistence_path {
        Some(path) => DonationLedger::load_from_file(path)?,
        None => DonationLedger::new(None),
    };

    Ok(Services {
        engine: Arc::new(engine),
        ledger: Arc::new(ledger),
        events,
    })
}

/// Start the platform listener and every configured campaign listener.
///
/// Failures are logged; the engine keeps serving verification either way.
pub async fn resume_listeners(engine: &PaymentEngine, config: &EngineConfig) {
    match engine.start_platform_listener().await {
        Ok(Some(outcome)) => info!(
            wallet = %outcome.handle.wallet,
            mode = outcome.handle.connection_kind.as_str(),
            "Platform listener running"
        ),
        Ok(None) => {}
        Err(e) => error!(error = %e, "Platform listener not started"),
    }

    let campaigns: Vec<MonitoredEntity> = config.campaigns.iter().map(MonitoredEntity::from).collect();
    if campaigns.is_empty() {
        return;
    }
    if let Err(e) = engine.start_all_campaign_listeners(&campaigns).await {
        error!(error = %e, "Campaign listeners not started");
    }
}
