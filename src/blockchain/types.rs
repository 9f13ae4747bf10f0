//! Chain-specific types and error definitions.

use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::Log;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// EVM networks the engine knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Bsc,
    Polygon,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Ethereum, Network::Bsc, Network::Polygon];

    /// Lowercase name, also the prefix of this network's settings keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Bsc => "bsc",
            Network::Polygon => "polygon",
        }
    }

    pub fn chain_id(&self) -> ChainId {
        match self {
            Network::Ethereum => ChainId(1),
            Network::Bsc => ChainId(56),
            Network::Polygon => ChainId(137),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(Network::Ethereum),
            "bsc" | "bnb" => Ok(Network::Bsc),
            "polygon" | "matic" => Ok(Network::Polygon),
            other => Err(ChainError::UnknownNetwork(other.to_string())),
        }
    }
}

/// The asset a payment is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// The network's native coin (ETH, BNB, MATIC).
    Native,
    /// An ERC-20 contract.
    Erc20(Address),
}

impl Token {
    pub fn contract(&self) -> Option<Address> {
        match self {
            Token::Native => None,
            Token::Erc20(address) => Some(*address),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Native => f.write_str("native"),
            Token::Erc20(address) => write!(f, "{address}"),
        }
    }
}

impl FromStr for Token {
    type Err = ChainError;

    /// Empty strings, `native` and the zero address all denote the native asset.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("native") {
            return Ok(Token::Native);
        }
        let address = Address::from_str(s)
            .map_err(|e| ChainError::InvalidAddress(format!("{s}: {e}")))?;
        if address == Address::ZERO {
            Ok(Token::Native)
        } else {
            Ok(Token::Erc20(address))
        }
    }
}

impl Serialize for Token {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC connection or request failed. Retryable.
    #[error("RPC error: {0}")]
    Network(String),

    /// RPC request timed out. Retryable.
    #[error("RPC timeout after {0} ms")]
    Timeout(u64),

    /// The node answered with something we could not decode.
    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),

    /// A live subscription lost its connection.
    #[error("Subscription disconnected: {0}")]
    SubscriptionDisconnected(String),

    /// Endpoint URL could not be parsed.
    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// Address or hash string could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown network '{0}'")]
    UnknownNetwork(String),

    /// Amount cannot be represented at the requested precision.
    #[error("Amount conversion failed: {0}")]
    Conversion(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

impl ChainError {
    /// Whether the failure is worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Network(_) | ChainError::Timeout(_) | ChainError::SubscriptionDisconnected(_)
        )
    }
}

/// Result type for blockchain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// The parts of a mined receipt the engine cares about.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    /// `false` when the transaction reverted.
    pub success: bool,
    pub from: Address,
    pub to: Option<Address>,
    pub logs: Vec<Log>,
}

/// The parts of a transaction body the engine cares about.
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub block_number: Option<u64>,
}

/// A token Transfer event, decoded from a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub log_index: Option<u64>,
    pub tx_hash: Option<TxHash>,
    pub block_number: Option<u64>,
}
