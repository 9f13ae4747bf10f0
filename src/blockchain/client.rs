//! Blockchain RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to the JSON-RPC endpoint (primary + backup)
//! - Query chain state (block number, receipts, transactions, logs)
//! - Open WebSocket log subscriptions when an endpoint is configured
//! - Classify failures as transient (`Network`/`Timeout`) or `MalformedResponse`

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use alloy::consensus::Transaction as _;
use alloy::network::TransactionResponse;
use alloy::primitives::{Address, TxHash};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::transports::{RpcError, TransportResult};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use tokio::time::timeout;
use url::Url;

use crate::blockchain::erc20::{decode_transfer_logs, transfer_filter};
use crate::blockchain::types::{ChainError, ChainResult, DecodedTransfer, Receipt, TransactionInfo};
use crate::config::NetworkConfig;
use crate::observability::metrics;

/// Live sequence of inbound transfers. Ends when the connection drops.
pub type TransferStream = BoxStream<'static, DecodedTransfer>;

/// Everything the verifier and listeners need from a node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Receipt of a mined transaction; `None` while it is still pending.
    async fn receipt(&self, tx_hash: TxHash) -> ChainResult<Option<Receipt>>;

    async fn transaction(&self, tx_hash: TxHash) -> ChainResult<Option<TransactionInfo>>;

    async fn latest_block_number(&self) -> ChainResult<u64>;

    /// Transfers of `token` into `recipient` mined in `from_block..=to_block`.
    async fn transfer_logs(
        &self,
        token: Address,
        recipient: Address,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<DecodedTransfer>>;

    /// Push-based stream of transfers of `token` into `recipient`.
    ///
    /// Dropping the stream releases the underlying connection.
    async fn subscribe_transfers(&self, token: Address, recipient: Address) -> ChainResult<TransferStream>;

    /// Whether `subscribe_transfers` can possibly succeed.
    fn supports_subscriptions(&self) -> bool;
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Alloy-backed [`ChainClient`] with failover across the primary and backup endpoints.
#[derive(Clone)]
pub struct RpcChainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    ws_endpoint: Option<Url>,
    config: NetworkConfig,
    timeout_duration: Duration,
}

impl RpcChainClient {
    /// Create a new client. No network traffic happens until the first call.
    pub fn new(config: NetworkConfig) -> ChainResult<Self> {
        let mut providers: Vec<DynProvider> = Vec::new();
        providers.push(Arc::new(
            ProviderBuilder::new().connect_http(config.http_endpoint.clone()),
        ));
        if let Some(backup) = &config.backup_endpoint {
            providers.push(Arc::new(ProviderBuilder::new().connect_http(backup.clone())));
        }

        let ws_endpoint = config.ws_endpoint.clone().filter(|url| {
            let supported = matches!(url.scheme(), "ws" | "wss");
            if !supported {
                tracing::warn!(url = %url, "Ignoring WebSocket endpoint with unsupported scheme");
            }
            supported
        });

        tracing::info!(
            network = %config.network,
            rpc_url = %config.http_endpoint,
            backup = config.backup_endpoint.is_some(),
            websocket = ws_endpoint.is_some(),
            timeout_ms = config.request_timeout.as_millis() as u64,
            "Chain client initialized"
        );

        Ok(Self {
            providers,
            ws_endpoint,
            timeout_duration: config.request_timeout,
            config,
        })
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        let actual = self
            .call("eth_chainId", |p| async move { p.get_chain_id().await })
            .await?;
        let expected = self.config.chain_id.0;
        if actual != expected {
            return Err(ChainError::ChainMismatch { expected, actual });
        }
        Ok(())
    }

    /// Check if the node is reachable.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.latest_block_number().await.is_ok();
        metrics::record_chain_health(self.config.network.as_str(), healthy);
        healthy
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout_duration.as_millis() as u64
    }

    /// Run one RPC call against each provider in turn until one answers.
    async fn call<T, F, Fut>(&self, method: &'static str, f: F) -> ChainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let mut last_error = None;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, f(provider.clone())).await {
                Ok(Ok(result)) => {
                    metrics::record_rpc_call(method, "ok");
                    return Ok(result);
                }
                Ok(Err(e @ RpcError::DeserError { .. })) => {
                    metrics::record_rpc_call(method, "malformed");
                    return Err(ChainError::MalformedResponse(format!("{method}: {e}")));
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                    last_error = Some(ChainError::Network(format!("{method}: {e}")));
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                    last_error = Some(ChainError::Timeout(self.timeout_ms()));
                }
            }
        }
        metrics::record_rpc_call(method, "failed");
        Err(last_error.unwrap_or_else(|| ChainError::Network(format!("{method}: no RPC providers"))))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn receipt(&self, tx_hash: TxHash) -> ChainResult<Option<Receipt>> {
        let receipt = self
            .call("eth_getTransactionReceipt", move |p| async move {
                p.get_transaction_receipt(tx_hash).await
            })
            .await?;

        Ok(receipt.map(|r| Receipt {
            transaction_hash: r.transaction_hash,
            block_number: r.block_number,
            success: r.status(),
            from: r.from,
            to: r.to,
            logs: r.inner.logs().to_vec(),
        }))
    }

    async fn transaction(&self, tx_hash: TxHash) -> ChainResult<Option<TransactionInfo>> {
        let tx = self
            .call("eth_getTransactionByHash", move |p| async move {
                p.get_transaction_by_hash(tx_hash).await
            })
            .await?;

        Ok(tx.map(|tx| TransactionInfo {
            hash: TransactionResponse::tx_hash(&tx),
            from: TransactionResponse::from(&tx),
            to: tx.to(),
            value: tx.value(),
            block_number: tx.block_number,
        }))
    }

    async fn latest_block_number(&self) -> ChainResult<u64> {
        self.call("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    async fn transfer_logs(
        &self,
        token: Address,
        recipient: Address,
        from_block: u64,
        to_block: u64,
    ) -> ChainResult<Vec<DecodedTransfer>> {
        let filter = transfer_filter(token, recipient)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .call("eth_getLogs", |p| {
                let filter = filter.clone();
                async move { p.get_logs(&filter).await }
            })
            .await?;

        Ok(decode_transfer_logs(&logs, token)
            .into_iter()
            .filter(|t| t.to == recipient)
            .collect())
    }

    async fn subscribe_transfers(&self, token: Address, recipient: Address) -> ChainResult<TransferStream> {
        let ws_url = self.ws_endpoint.clone().ok_or_else(|| {
            ChainError::SubscriptionDisconnected("no WebSocket endpoint configured".to_string())
        })?;

        let connect = ProviderBuilder::new().connect_ws(WsConnect::new(ws_url.as_str()));
        let provider = timeout(self.timeout_duration, connect)
            .await
            .map_err(|_| ChainError::Timeout(self.timeout_ms()))?
            .map_err(|e| ChainError::Network(format!("WebSocket connect to {ws_url} failed: {e}")))?;
        let provider: DynProvider = Arc::new(provider);

        let filter = transfer_filter(token, recipient);
        let subscription = timeout(self.timeout_duration, provider.subscribe_logs(&filter))
            .await
            .map_err(|_| ChainError::Timeout(self.timeout_ms()))?
            .map_err(|e| ChainError::Network(format!("eth_subscribe failed: {e}")))?;
        metrics::record_rpc_call("eth_subscribe", "ok");

        let inner = subscription
            .into_stream()
            .filter_map(move |log| {
                // Reorged-out logs are re-announced with `removed` set.
                if log.removed {
                    return futures_util::future::ready(None);
                }
                let transfer = decode_transfer_logs(std::slice::from_ref(&log), token)
                    .into_iter()
                    .find(|t| t.to == recipient);
                futures_util::future::ready(transfer)
            })
            .boxed();

        Ok(WsTransferStream {
            inner,
            _provider: provider,
        }
        .boxed())
    }

    fn supports_subscriptions(&self) -> bool {
        self.ws_endpoint.is_some()
    }
}

/// Keeps the WebSocket provider alive exactly as long as the stream.
struct WsTransferStream {
    inner: TransferStream,
    _provider: DynProvider,
}

impl Stream for WsTransferStream {
    type Item = DecodedTransfer;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("network", &self.config.network)
            .field("rpc_url", &self.config.http_endpoint.as_str())
            .field("providers", &self.providers.len())
            .field("websocket", &self.ws_endpoint.is_some())
            .finish()
    }
}
