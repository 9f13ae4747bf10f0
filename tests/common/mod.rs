//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, Address, Bytes, LogData, TxHash, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use payment_monitor::blockchain::erc20::Transfer;
use payment_monitor::blockchain::{
    ChainClient, ChainError, ChainResult, DecodedTransfer, Receipt, TransactionInfo, TransferStream,
};
use payment_monitor::config::{EmptySettingsStore, EngineConfig, NetworkConfig, NetworkConfigProvider, SettingsStore};
use payment_monitor::engine::{ChainConnector, PaymentEngine};
use payment_monitor::payments::TransferObserved;

pub const USDT: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
pub const PLATFORM: Address = address!("2222222222222222222222222222222222222222");
pub const DONOR: Address = address!("1111111111111111111111111111111111111111");
pub const CAMPAIGN_WALLET: Address = address!("4444444444444444444444444444444444444444");
pub const STRANGER: Address = address!("5555555555555555555555555555555555555555");

/// Scripted [`ChainClient`]: receipts, transactions and logs are whatever the test put in.
#[derive(Default)]
pub struct MockChainClient {
    receipts: Mutex<HashMap<TxHash, Receipt>>,
    transactions: Mutex<HashMap<TxHash, TransactionInfo>>,
    transfers: Mutex<Vec<DecodedTransfer>>,
    head: AtomicU64,
    websocket: AtomicBool,
    live: Mutex<Vec<(Address, mpsc::UnboundedSender<DecodedTransfer>)>>,
    subscribe_calls: AtomicUsize,
    receipt_failures: AtomicUsize,
    malformed_receipts: AtomicBool,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept WebSocket subscriptions.
    pub fn with_websocket(self) -> Self {
        self.websocket.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_head(&self, block: u64) {
        self.head.store(block, Ordering::SeqCst);
    }

    pub fn add_receipt(&self, receipt: Receipt) {
        self.receipts.lock().unwrap().insert(receipt.transaction_hash, receipt);
    }

    pub fn add_transaction(&self, tx: TransactionInfo) {
        self.transactions.lock().unwrap().insert(tx.hash, tx);
    }

    /// A transfer returned by `transfer_logs` when its block is in range.
    pub fn add_transfer(&self, transfer: DecodedTransfer) {
        self.transfers.lock().unwrap().push(transfer);
    }

    /// Push a transfer to every open subscription for its recipient.
    pub fn push_live(&self, transfer: DecodedTransfer) -> usize {
        let live = self.live.lock().unwrap();
        live.iter()
            .filter(|(recipient, _)| *recipient == transfer.to)
            .filter(|(_, tx)| tx.send(transfer.clone()).is_ok())
            .count()
    }

    /// End every open subscription stream, as a dropped socket would.
    pub fn disconnect_all(&self) {
        self.live.lock().unwrap().clear();
    }

    pub fn open_subscriptions(&self) -> usize {
        self.live.lock().unwrap().iter().filter(|(_, tx)| !tx.is_closed()).count()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Fail the next `n` receipt lookups with a transient network error.
    pub fn fail_next_receipts(&self, n: usize) {
        self.receipt_failures.store(n, Ordering::SeqCst);
    }

    pub fn return_malformed_receipts(&self) {
        self.malformed_receipts.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn receipt(&self, tx_hash: TxHash) -> ChainResult<Option<Receipt>> {
        if self
            .receipt_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainError::Network("connection reset".to_string()));
        }
        if self.malformed_receipts.load(Ordering::SeqCst) {
            return Err(ChainError::MalformedResponse("unexpected field".to_string()));
        }
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn transaction(&self, tx_hash: TxHash) -> ChainResult<Option<TransactionInfo>> {
        Ok(self.transactions.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn latest_block_number(&self) -> ChainResult<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn transfer_logs(
        &self,
        _token: Address,
        recipient: Address,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<DecodedTransfer>> {
        Ok(self
            .transfers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.to == recipient)
            .filter(|t| t.block_number.is_some_and(|b| (from_block..=to_block).contains(&b)))
            .cloned()
            .collect())
    }

    async fn subscribe_transfers(&self, _token: Address, recipient: Address) -> ChainResult<TransferStream> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.websocket.load(Ordering::SeqCst) {
            return Err(ChainError::SubscriptionDisconnected("no WebSocket endpoint configured".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.live.lock().unwrap().push((recipient, tx));
        Ok(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|transfer| (transfer, rx))
        })
        .boxed())
    }

    fn supports_subscriptions(&self) -> bool {
        self.websocket.load(Ordering::SeqCst)
    }
}

/// Hands out the same mock for every network.
pub struct MockConnector(pub Arc<MockChainClient>);

impl ChainConnector for MockConnector {
    fn connect(&self, _config: &NetworkConfig) -> ChainResult<Arc<dyn ChainClient>> {
        Ok(self.0.clone())
    }
}

pub fn tx_hash(byte: u8) -> TxHash {
    TxHash::repeat_byte(byte)
}

/// Transfer of `value` raw units into `to`, mined in `block`.
pub fn transfer(tx: u8, to: Address, value: u64, block: u64) -> DecodedTransfer {
    DecodedTransfer {
        from: DONOR,
        to,
        value: U256::from(value),
        log_index: Some(0),
        tx_hash: Some(tx_hash(tx)),
        block_number: Some(block),
    }
}

pub fn transfer_log(token: Address, from: Address, to: Address, value: U256, tx: TxHash) -> Log {
    let data = LogData::new_unchecked(
        vec![Transfer::SIGNATURE_HASH, from.into_word(), to.into_word()],
        Bytes::from(value.to_be_bytes::<32>().to_vec()),
    );
    Log {
        inner: alloy::primitives::Log { address: token, data },
        block_hash: None,
        block_number: Some(100),
        block_timestamp: None,
        transaction_hash: Some(tx),
        transaction_index: Some(0),
        log_index: Some(0),
        removed: false,
    }
}

/// Mined receipt whose logs are `logs`.
pub fn receipt(tx: TxHash, success: bool, logs: Vec<Log>) -> Receipt {
    Receipt {
        transaction_hash: tx,
        block_number: Some(100),
        success,
        from: DONOR,
        to: Some(USDT),
        logs,
    }
}

/// Receipt for a USDT transfer of `value` raw units (6 decimals) into `to`.
pub fn usdt_receipt(tx: TxHash, to: Address, value: u64) -> Receipt {
    receipt(tx, true, vec![transfer_log(USDT, DONOR, to, U256::from(value), tx)])
}

/// Engine config with fast timings and the platform wallet set.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.monitor.platform_wallet = PLATFORM.to_string();
    config.monitor.poll_interval_ms = 20;
    config.monitor.reconnect_backoff_ms = 10;
    config.monitor.max_reconnect_backoff_ms = 50;
    config.monitor.max_block_range = 2;
    config.verification.base_delay_ms = 1;
    config.verification.max_delay_ms = 5;
    config
}

/// Provider whose settings come only from `values`.
pub fn provider_with(values: &[(&str, &str)]) -> Arc<NetworkConfigProvider> {
    let fallbacks = values
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Arc::new(NetworkConfigProvider::with_fallbacks(
        Arc::new(EmptySettingsStore),
        Duration::from_secs(300),
        fallbacks,
    ))
}

pub async fn build_engine(
    client: Arc<MockChainClient>,
    config: &EngineConfig,
    settings: Arc<dyn SettingsStore>,
) -> (PaymentEngine, mpsc::Receiver<TransferObserved>) {
    PaymentEngine::new(config, settings, provider_with(&[]), Arc::new(MockConnector(client)))
        .await
        .expect("engine builds")
}

/// Wait until `check` holds, polling every few milliseconds.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Next event on `rx`, failing the test after a few seconds.
pub async fn next_event(rx: &mut mpsc::Receiver<TransferObserved>) -> TransferObserved {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no event in time")
        .expect("channel closed")
}
