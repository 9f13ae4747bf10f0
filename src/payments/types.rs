//! Payment verification and monitoring types.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, TxHash};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::{ChainError, Network, Token};
use crate::config::CampaignConfig;

/// Who a subscription belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Campaign(String),
    /// The platform wallet collecting activation fees.
    Platform,
}

impl EntityId {
    pub fn campaign(id: impl Into<String>) -> Self {
        EntityId::Campaign(id.into())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Campaign(id) => f.write_str(id),
            EntityId::Platform => f.write_str("platform"),
        }
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "platform" {
            EntityId::Platform
        } else {
            EntityId::Campaign(s.to_string())
        })
    }
}

impl Serialize for EntityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.parse::<EntityId>() {
            Ok(id) => Ok(id),
            Err(never) => match never {},
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    #[serde(rename = "websocket")]
    WebSocket,
    #[serde(rename = "http-poll")]
    HttpPoll,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::WebSocket => "websocket",
            ConnectionKind::HttpPoll => "http-poll",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Starting,
    Active,
    Reconnecting,
    Stopped,
}

/// Operational snapshot of one listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionHandle {
    pub entity_id: EntityId,
    pub wallet: Address,
    pub connection_kind: ConnectionKind,
    pub status: SubscriptionStatus,
    /// Changes every time the watchdog restarts the listener.
    pub subscription_id: Uuid,
    /// Unix seconds.
    pub started_at: u64,
    pub last_seen_block: Option<u64>,
    pub restarts: u32,
}

/// An inbound transfer seen by a listener. Delivered at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferObserved {
    pub entity_id: EntityId,
    pub tx_hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub amount: Decimal,
    pub token: Address,
    pub block_number: u64,
    pub log_index: Option<u64>,
    /// Unix seconds.
    pub observed_at: u64,
}

/// What a transaction must contain to count as payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferExpectation {
    pub token: Token,
    pub recipient: Address,
    pub min_amount: Decimal,
    pub decimals: u8,
}

/// Outcome of checking one transaction against a [`TransferExpectation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationResult {
    Confirmed {
        amount: Decimal,
        from: Address,
        to: Address,
        block_number: u64,
    },
    AmountMismatch {
        expected: Decimal,
        actual: Decimal,
    },
    /// Not mined yet, or no such transaction.
    NotFound,
    /// Mined, but execution failed.
    Reverted,
    RecipientMismatch,
}

impl VerificationResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, VerificationResult::Confirmed { .. })
    }

    /// Metric label.
    pub fn outcome(&self) -> &'static str {
        match self {
            VerificationResult::Confirmed { .. } => "confirmed",
            VerificationResult::AmountMismatch { .. } => "amount_mismatch",
            VerificationResult::NotFound => "not_found",
            VerificationResult::Reverted => "reverted",
            VerificationResult::RecipientMismatch => "recipient_mismatch",
        }
    }

    /// Text for the payer. Each failure implies a different next step.
    pub fn user_message(&self) -> &'static str {
        match self {
            VerificationResult::Confirmed { .. } => "Payment confirmed.",
            VerificationResult::NotFound => {
                "Transaction not confirmed yet. Please wait a moment and try again."
            }
            VerificationResult::AmountMismatch { .. } => {
                "Payment amount is insufficient. Please send the remaining amount."
            }
            VerificationResult::Reverted => {
                "Transaction failed on-chain. No funds were transferred; please pay again."
            }
            VerificationResult::RecipientMismatch => {
                "Transaction did not pay the expected address. Please check the recipient."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    AlreadyActive,
    Started,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub status: StartStatus,
    pub handle: SubscriptionHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    NotActive,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAllSummary {
    pub started: usize,
    /// Entities that already had a listener.
    pub already_active: usize,
    pub failed: usize,
}

/// A campaign as the persistence layer reports it at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredEntity {
    pub id: String,
    pub wallet: String,
    pub active: bool,
}

impl From<&CampaignConfig> for MonitoredEntity {
    fn from(config: &CampaignConfig) -> Self {
        Self {
            id: config.id.clone(),
            wallet: config.wallet.clone(),
            active: config.active,
        }
    }
}

/// Errors from listener management.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("blockchain monitoring is disabled for {0}")]
    MonitoringDisabled(Network),

    #[error("invalid wallet address '{0}'")]
    InvalidWallet(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
