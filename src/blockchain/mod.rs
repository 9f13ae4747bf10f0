//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! NetworkConfig (endpoints, timeout)
//!     → client.rs (JSON-RPC with failover, optional WebSocket subscriptions)
//!     → erc20.rs (Transfer log decoding and filters)
//!     → units.rs (raw integer ↔ decimal amounts)
//! ```
//!
//! # Constraints
//! - All RPC calls have configurable timeouts
//! - Undecodable logs are skipped, never fatal
//! - No keys or signing: the engine only reads the chain

pub mod client;
pub mod erc20;
pub mod types;
pub mod units;

pub use client::{ChainClient, RpcChainClient, TransferStream};
pub use erc20::decode_transfer_logs;
pub use types::{ChainError, ChainId, ChainResult, DecodedTransfer, Network, Receipt, Token, TransactionInfo};
