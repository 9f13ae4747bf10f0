//! One wallet's inbound-transfer listener.
//!
//! # State machine
//! ```text
//! Starting ─▶ Active ─(disconnect / poll error)─▶ Reconnecting ─▶ Active
//!    │          │                                     │
//!    └──────────┴──────────────(stop)─────────────────┴──▶ Stopped
//! ```
//!
//! A WebSocket subscription is tried first. If it cannot be established on the
//! first attempt the listener falls back to HTTP polling for the rest of its life.
//! After a WebSocket reconnect the blocks missed while disconnected are re-scanned
//! over HTTP (bounded by `reconcile_blocks`), so delivery is at-least-once.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::blockchain::{units, ChainClient, ChainResult, DecodedTransfer, TransferStream};
use crate::config::MonitorConfig;
use crate::observability::metrics;
use crate::payments::types::{unix_now, ConnectionKind, EntityId, SubscriptionStatus, TransferObserved};
use crate::resilience::calculate_backoff;

/// Timing knobs shared by every listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionSettings {
    pub poll_interval: Duration,
    pub reconnect_backoff_ms: u64,
    pub max_reconnect_backoff_ms: u64,
    pub max_block_range: u64,
    pub reconcile_blocks: u64,
}

impl From<&MonitorConfig> for SubscriptionSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            reconnect_backoff_ms: config.reconnect_backoff_ms,
            max_reconnect_backoff_ms: config.max_reconnect_backoff_ms,
            max_block_range: config.max_block_range.max(1),
            reconcile_blocks: config.reconcile_blocks,
        }
    }
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

/// Live view of a listener, published by its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,
    pub connection_kind: ConnectionKind,
    pub last_seen_block: Option<u64>,
}

/// What the listener watches and where it reports.
#[derive(Clone)]
pub struct SubscriptionTarget {
    pub entity_id: EntityId,
    pub wallet: Address,
    pub token: Address,
    pub decimals: u8,
}

/// Handle to a running listener task.
pub struct WalletSubscription {
    stop: watch::Sender<bool>,
    state: watch::Receiver<SubscriptionState>,
    task: JoinHandle<()>,
}

impl WalletSubscription {
    /// Spawn the listener. Events go to `events` until [`stop`](Self::stop) is called
    /// or the receiving side is dropped.
    pub fn start(
        target: SubscriptionTarget,
        client: Arc<dyn ChainClient>,
        settings: SubscriptionSettings,
        events: mpsc::Sender<TransferObserved>,
    ) -> Self {
        let connection_kind = if client.supports_subscriptions() {
            ConnectionKind::WebSocket
        } else {
            ConnectionKind::HttpPoll
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SubscriptionState {
            status: SubscriptionStatus::Starting,
            connection_kind,
            last_seen_block: None,
        });

        let worker = Worker {
            target,
            client,
            settings,
            events,
            stop: stop_rx,
            state: state_tx,
            last_seen_block: None,
        };
        let task = tokio::spawn(worker.run());

        Self {
            stop: stop_tx,
            state: state_rx,
            task,
        }
    }

    /// Ask the listener to stop. Idempotent; returns immediately.
    ///
    /// Dropping the handle has the same effect.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// `true` once the task has exited, for any reason.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!(error = %e, "Subscription task panicked");
            }
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

struct Worker {
    target: SubscriptionTarget,
    client: Arc<dyn ChainClient>,
    settings: SubscriptionSettings,
    events: mpsc::Sender<TransferObserved>,
    stop: watch::Receiver<bool>,
    state: watch::Sender<SubscriptionState>,
    last_seen_block: Option<u64>,
}

/// Resolves once a stop has been requested or the handle is gone.
async fn stop_requested(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

impl Worker {
    async fn run(mut self) {
        let kind = self.state.borrow().connection_kind;
        info!(
            entity = %self.target.entity_id,
            wallet = %self.target.wallet,
            mode = kind.as_str(),
            "Starting wallet listener"
        );

        match kind {
            ConnectionKind::WebSocket => self.run_websocket().await,
            ConnectionKind::HttpPoll => self.run_polling().await,
        }

        self.set_status(SubscriptionStatus::Stopped);
        info!(entity = %self.target.entity_id, wallet = %self.target.wallet, "Wallet listener stopped");
    }

    async fn run_websocket(&mut self) {
        let mut established = false;
        let mut attempt = 0u32;

        loop {
            let subscribe = self
                .client
                .subscribe_transfers(self.target.token, self.target.wallet);
            let result = tokio::select! {
                _ = stop_requested(self.stop.clone()) => return,
                result = subscribe => result,
            };

            match result {
                Ok(stream) => {
                    if established {
                        if let Flow::Stop = self.reconcile().await {
                            return;
                        }
                    } else {
                        established = true;
                        self.mark_head().await;
                    }
                    attempt = 0;
                    self.set_status(SubscriptionStatus::Active);
                    if let Flow::Stop = self.consume(stream).await {
                        return;
                    }
                    warn!(entity = %self.target.entity_id, "WebSocket subscription disconnected");
                }
                Err(e) if !established => {
                    warn!(
                        entity = %self.target.entity_id,
                        error = %e,
                        "WebSocket subscription unavailable, falling back to HTTP polling"
                    );
                    self.state
                        .send_modify(|s| s.connection_kind = ConnectionKind::HttpPoll);
                    return self.run_polling().await;
                }
                Err(e) => {
                    warn!(entity = %self.target.entity_id, error = %e, "WebSocket resubscribe failed");
                }
            }

            attempt += 1;
            self.set_status(SubscriptionStatus::Reconnecting);
            metrics::record_reconnect();
            let delay = self.backoff(attempt);
            debug!(entity = %self.target.entity_id, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            if let Flow::Stop = self.pause(delay).await {
                return;
            }
        }
    }

    async fn consume(&mut self, mut stream: TransferStream) -> Flow {
        loop {
            let next = tokio::select! {
                _ = stop_requested(self.stop.clone()) => return Flow::Stop,
                next = stream.next() => next,
            };
            match next {
                Some(transfer) => {
                    if let Flow::Stop = self.emit(transfer, ConnectionKind::WebSocket).await {
                        return Flow::Stop;
                    }
                }
                None => return Flow::Continue,
            }
        }
    }

    /// Record the chain head at subscribe time as the reconciliation anchor.
    async fn mark_head(&mut self) {
        match self.client.latest_block_number().await {
            Ok(head) => self.advance(head),
            Err(e) => debug!(entity = %self.target.entity_id, error = %e, "Could not read chain head"),
        }
    }

    /// Re-scan the blocks a dropped WebSocket may have missed. Best effort.
    async fn reconcile(&mut self) -> Flow {
        let head = match self.client.latest_block_number().await {
            Ok(head) => head,
            Err(e) => {
                warn!(entity = %self.target.entity_id, error = %e, "Skipping reconciliation, chain head unavailable");
                return Flow::Continue;
            }
        };
        let earliest = head.saturating_sub(self.settings.reconcile_blocks);
        // The last seen block is scanned again since it may hold later logs.
        let from = self.last_seen_block.unwrap_or(earliest).max(earliest);

        info!(entity = %self.target.entity_id, from, to = head, "Reconciling missed blocks");
        match self.scan(from, head, ConnectionKind::WebSocket).await {
            Ok(flow) => flow,
            Err(e) => {
                warn!(entity = %self.target.entity_id, error = %e, "Reconciliation failed");
                Flow::Continue
            }
        }
    }

    async fn run_polling(&mut self) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = stop_requested(self.stop.clone()) => return,
                _ = ticker.tick() => {}
            }

            match self.poll_once().await {
                Ok(Flow::Stop) => return,
                Ok(Flow::Continue) => {
                    failures = 0;
                    self.set_status(SubscriptionStatus::Active);
                }
                Err(e) => {
                    failures += 1;
                    warn!(entity = %self.target.entity_id, error = %e, failures, "Polling failed");
                    self.set_status(SubscriptionStatus::Reconnecting);
                    metrics::record_reconnect();
                    if let Flow::Stop = self.pause(self.backoff(failures)).await {
                        return;
                    }
                }
            }
        }
    }

    async fn poll_once(&mut self) -> ChainResult<Flow> {
        let head = self.client.latest_block_number().await?;
        let Some(last) = self.last_seen_block else {
            // First poll only establishes where to start from.
            self.advance(head);
            return Ok(Flow::Continue);
        };
        if head <= last {
            return Ok(Flow::Continue);
        }
        self.scan(last + 1, head, ConnectionKind::HttpPoll).await
    }

    /// Fetch and emit transfers in `from..=to`, in `max_block_range` chunks.
    async fn scan(&mut self, from: u64, to: u64, mode: ConnectionKind) -> ChainResult<Flow> {
        for (start, end) in block_chunks(from, to, self.settings.max_block_range) {
            let transfers = self
                .client
                .transfer_logs(self.target.token, self.target.wallet, start, end)
                .await?;
            for transfer in transfers {
                if let Flow::Stop = self.emit(transfer, mode).await {
                    return Ok(Flow::Stop);
                }
            }
            self.advance(end);
        }
        Ok(Flow::Continue)
    }

    async fn emit(&mut self, transfer: DecodedTransfer, mode: ConnectionKind) -> Flow {
        let (Some(tx_hash), Some(block_number)) = (transfer.tx_hash, transfer.block_number) else {
            debug!(entity = %self.target.entity_id, "Ignoring transfer without a mined transaction");
            return Flow::Continue;
        };
        let amount = units::to_decimal_saturating(transfer.value, self.target.decimals);

        let event = TransferObserved {
            entity_id: self.target.entity_id.clone(),
            tx_hash,
            from: transfer.from,
            to: transfer.to,
            amount,
            token: self.target.token,
            block_number,
            log_index: transfer.log_index,
            observed_at: unix_now(),
        };
        info!(
            entity = %event.entity_id,
            tx_hash = %event.tx_hash,
            from = %event.from,
            amount = %event.amount,
            block = block_number,
            "Inbound transfer observed"
        );
        metrics::record_transfer_observed(mode.as_str());

        let send = self.events.send(event);
        let sent = tokio::select! {
            _ = stop_requested(self.stop.clone()) => return Flow::Stop,
            sent = send => sent,
        };
        if sent.is_err() {
            warn!(entity = %self.target.entity_id, "Event receiver dropped, stopping listener");
            return Flow::Stop;
        }
        self.advance(block_number);
        Flow::Continue
    }

    fn advance(&mut self, block: u64) {
        if self.last_seen_block.is_some_and(|seen| seen >= block) {
            return;
        }
        self.last_seen_block = Some(block);
        self.state.send_modify(|s| s.last_seen_block = Some(block));
    }

    fn set_status(&self, status: SubscriptionStatus) {
        self.state.send_if_modified(|s| {
            let changed = s.status != status;
            s.status = status;
            changed
        });
    }

    fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.settings.reconnect_backoff_ms,
            self.settings.max_reconnect_backoff_ms,
        )
    }

    async fn pause(&self, delay: Duration) -> Flow {
        tokio::select! {
            _ = stop_requested(self.stop.clone()) => Flow::Stop,
            _ = sleep(delay) => Flow::Continue,
        }
    }
}

/// Split `from..=to` into inclusive ranges of at most `size` blocks.
fn block_chunks(from: u64, to: u64, size: u64) -> impl Iterator<Item = (u64, u64)> {
    let size = size.max(1);
    let mut next = Some(from).filter(|start| *start <= to);
    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(size - 1).min(to);
        next = end.checked_add(1).filter(|n| *n <= to);
        Some((start, end))
    })
}
