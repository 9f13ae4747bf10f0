//! Registry of running wallet listeners.
//!
//! At most one listener exists per entity. The check-and-insert in
//! [`SubscriptionSupervisor::start_listener`] runs under the map's shard lock,
//! so concurrent starts for the same entity open one connection.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::blockchain::ChainClient;
use crate::observability::metrics;
use crate::payments::subscription::{SubscriptionSettings, SubscriptionTarget, WalletSubscription};
use crate::payments::types::{
    unix_now, EntityId, MonitorError, MonitoredEntity, StartAllSummary, StartOutcome, StartStatus, StopStatus,
    SubscriptionHandle, TransferObserved,
};

struct Listener {
    wallet: Address,
    subscription_id: Uuid,
    started_at: u64,
    restarts: u32,
    subscription: WalletSubscription,
}

impl Listener {
    fn handle(&self, entity_id: &EntityId) -> SubscriptionHandle {
        let state = self.subscription.state();
        SubscriptionHandle {
            entity_id: entity_id.clone(),
            wallet: self.wallet,
            connection_kind: state.connection_kind,
            status: state.status,
            subscription_id: self.subscription_id,
            started_at: self.started_at,
            last_seen_block: state.last_seen_block,
            restarts: self.restarts,
        }
    }
}

/// Owns every listener of one network and token.
pub struct SubscriptionSupervisor {
    client: Arc<dyn ChainClient>,
    token: Address,
    decimals: u8,
    settings: SubscriptionSettings,
    events: mpsc::Sender<TransferObserved>,
    listeners: DashMap<EntityId, Listener>,
}

impl SubscriptionSupervisor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        token: Address,
        decimals: u8,
        settings: SubscriptionSettings,
        events: mpsc::Sender<TransferObserved>,
    ) -> Self {
        Self {
            client,
            token,
            decimals,
            settings,
            events,
            listeners: DashMap::new(),
        }
    }

    /// Start listening for transfers into `wallet`, unless `entity_id` already has a listener.
    pub fn start_listener(&self, entity_id: EntityId, wallet: Address) -> StartOutcome {
        let outcome = match self.listeners.entry(entity_id) {
            Entry::Occupied(entry) => {
                let handle = entry.get().handle(entry.key());
                if handle.wallet != wallet {
                    warn!(
                        entity = %handle.entity_id,
                        active_wallet = %handle.wallet,
                        requested_wallet = %wallet,
                        "Listener already active for a different wallet"
                    );
                }
                StartOutcome {
                    status: StartStatus::AlreadyActive,
                    handle,
                }
            }
            Entry::Vacant(entry) => {
                let listener = Listener {
                    wallet,
                    subscription_id: Uuid::new_v4(),
                    started_at: unix_now(),
                    restarts: 0,
                    subscription: self.spawn(entry.key().clone(), wallet),
                };
                let handle = listener.handle(entry.key());
                entry.insert(listener);
                info!(
                    entity = %handle.entity_id,
                    wallet = %wallet,
                    subscription_id = %handle.subscription_id,
                    "Listener started"
                );
                StartOutcome {
                    status: StartStatus::Started,
                    handle,
                }
            }
        };
        // Shard locks are released; len() would deadlock above.
        metrics::record_active_subscriptions(self.listeners.len());
        outcome
    }

    /// Signal the listener for `entity_id` to stop and forget it. Does not wait.
    pub fn stop_listener(&self, entity_id: &EntityId) -> StopStatus {
        let Some((_, listener)) = self.listeners.remove(entity_id) else {
            return StopStatus::NotActive;
        };
        listener.subscription.stop();
        metrics::record_active_subscriptions(self.listeners.len());
        info!(entity = %entity_id, wallet = %listener.wallet, "Listener stopped");
        StopStatus::Stopped
    }

    /// Start a listener for every active entity with a valid wallet.
    ///
    /// Failures are counted, never fatal.
    pub fn start_all(&self, entities: &[MonitoredEntity]) -> StartAllSummary {
        let mut summary = StartAllSummary::default();
        for entity in entities.iter().filter(|e| e.active) {
            match parse_wallet(&entity.wallet) {
                Ok(wallet) => match self.start_listener(EntityId::campaign(entity.id.as_str()), wallet).status {
                    StartStatus::Started => summary.started += 1,
                    StartStatus::AlreadyActive => summary.already_active += 1,
                },
                Err(e) => {
                    warn!(campaign = %entity.id, error = %e, "Cannot monitor campaign");
                    summary.failed += 1;
                }
            }
        }
        info!(
            started = summary.started,
            already_active = summary.already_active,
            failed = summary.failed,
            "Campaign listeners resumed"
        );
        summary
    }

    /// Snapshot of every listener, sorted by entity.
    pub fn status(&self) -> Vec<SubscriptionHandle> {
        let mut handles: Vec<_> = self
            .listeners
            .iter()
            .map(|entry| entry.value().handle(entry.key()))
            .collect();
        handles.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        handles
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<SubscriptionHandle> {
        self.listeners.get(entity_id).map(|l| l.handle(l.key()))
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Restart listeners whose task exited without being stopped.
    ///
    /// Returns how many were restarted.
    pub fn restart_dead(&self) -> usize {
        let mut restarted = 0;
        for mut entry in self.listeners.iter_mut() {
            if !entry.value().subscription.is_finished() {
                continue;
            }
            let entity_id = entry.key().clone();
            let listener = entry.value_mut();
            listener.subscription = self.spawn(entity_id.clone(), listener.wallet);
            listener.subscription_id = Uuid::new_v4();
            listener.restarts += 1;
            restarted += 1;
            error!(
                entity = %entity_id,
                wallet = %listener.wallet,
                restarts = listener.restarts,
                "Listener task died, restarted"
            );
        }
        restarted
    }

    /// Periodically restart dead listeners until `shutdown` fires.
    pub async fn run_watchdog(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.restart_dead();
                }
                _ = shutdown.recv() => {
                    info!("Listener watchdog stopping");
                    return;
                }
            }
        }
    }

    /// Stop every listener and wait for the tasks to exit.
    pub async fn shutdown(&self) {
        let entities: Vec<EntityId> = self.listeners.iter().map(|e| e.key().clone()).collect();
        let mut subscriptions = Vec::with_capacity(entities.len());
        for entity_id in entities {
            if let Some((_, listener)) = self.listeners.remove(&entity_id) {
                listener.subscription.stop();
                subscriptions.push(listener.subscription);
            }
        }
        let count = subscriptions.len();
        futures_util::future::join_all(subscriptions.into_iter().map(WalletSubscription::shutdown)).await;
        metrics::record_active_subscriptions(0);
        info!(count, "All listeners stopped");
    }

    fn spawn(&self, entity_id: EntityId, wallet: Address) -> WalletSubscription {
        WalletSubscription::start(
            SubscriptionTarget {
                entity_id,
                wallet,
                token: self.token,
                decimals: self.decimals,
            },
            self.client.clone(),
            self.settings,
            self.events.clone(),
        )
    }
}

/// Parse a wallet address, rejecting the zero address.
pub fn parse_wallet(raw: &str) -> Result<Address, MonitorError> {
    let wallet: Address = raw
        .trim()
        .parse()
        .map_err(|_| MonitorError::InvalidWallet(raw.to_string()))?;
    if wallet.is_zero() {
        return Err(MonitorError::InvalidWallet(raw.to_string()));
    }
    Ok(wallet)
}
