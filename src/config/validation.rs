//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (intervals > 0, buffers > 0)
//! - Detect duplicate campaign ids
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use alloy::primitives::Address;

use crate::blockchain::{units::MAX_DECIMALS, Token};
use crate::config::schema::{EngineConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let monitor = &config.monitor;

    match monitor.token_address.parse::<Token>() {
        Ok(Token::Native) => errors.push(ValidationError::new(
            "monitor.token_address",
            "listeners need an ERC-20 contract, not the native asset",
        )),
        Ok(Token::Erc20(_)) => {}
        Err(e) => errors.push(ValidationError::new("monitor.token_address", e.to_string())),
    }
    if monitor.token_decimals > MAX_DECIMALS {
        errors.push(ValidationError::new(
            "monitor.token_decimals",
            format!("must be at most {MAX_DECIMALS}"),
        ));
    }
    if !monitor.platform_wallet.is_empty() && monitor.platform_wallet.parse::<Address>().is_err() {
        errors.push(ValidationError::new("monitor.platform_wallet", "not a valid address"));
    }
    for (field, value) in [
        ("monitor.poll_interval_ms", monitor.poll_interval_ms),
        ("monitor.reconnect_backoff_ms", monitor.reconnect_backoff_ms),
        ("monitor.max_block_range", monitor.max_block_range),
        ("monitor.watchdog_secs", monitor.watchdog_secs),
        ("settings.cache_ttl_secs", config.settings.cache_ttl_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }
    if monitor.max_reconnect_backoff_ms < monitor.reconnect_backoff_ms {
        errors.push(ValidationError::new(
            "monitor.max_reconnect_backoff_ms",
            "must not be smaller than reconnect_backoff_ms",
        ));
    }
    if monitor.event_buffer == 0 {
        errors.push(ValidationError::new("monitor.event_buffer", "must be greater than zero"));
    }
    if config.verification.max_attempts == 0 {
        errors.push(ValidationError::new("verification.max_attempts", "must be at least 1"));
    }

    let mut seen = HashSet::new();
    for (i, campaign) in config.campaigns.iter().enumerate() {
        let field = format!("campaigns[{i}]");
        if campaign.id.trim().is_empty() {
            errors.push(ValidationError::new(&field, "id must not be empty"));
        } else if campaign.id == "platform" {
            errors.push(ValidationError::new(&field, "id 'platform' is reserved"));
        } else if !seen.insert(campaign.id.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate id '{}'", campaign.id)));
        }
        if campaign.wallet.parse::<Address>().is_err() {
            errors.push(ValidationError::new(&field, "wallet is not a valid address"));
        }
    }

    if config.admin.enabled {
        if config.admin.api_key == PLACEHOLDER_API_KEY || config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
