//! Transaction verification against an expected transfer.
//!
//! # Responsibilities
//! - Fetch the receipt (and the transaction for native payments)
//! - Pick the transfer into the expected recipient
//! - Apply the underpayment tolerance
//!
//! Transient RPC failures are retried here and surface as errors when the
//! retry budget runs out. They are never reported as a verdict.

use std::sync::Arc;

use alloy::primitives::{TxHash, U256};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::blockchain::{decode_transfer_logs, units, ChainClient, ChainError, ChainResult, DecodedTransfer, Token};
use crate::observability::metrics;
use crate::payments::types::{TransferExpectation, VerificationResult};
use crate::resilience::{retry_transient, RetryPolicy};

/// Fraction an observed amount may fall short of the expected one (1%).
///
/// Absorbs fee-on-transfer tokens and rounding in wallet UIs. Overpayment is always accepted.
pub const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Checks transactions against [`TransferExpectation`]s.
#[derive(Clone)]
pub struct TransferVerifier {
    client: Arc<dyn ChainClient>,
    retry: RetryPolicy,
}

impl TransferVerifier {
    pub fn new(client: Arc<dyn ChainClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Verify that `tx_hash` pays at least `expectation.min_amount` (within tolerance)
    /// of `expectation.token` to `expectation.recipient`.
    pub async fn verify(&self, tx_hash: TxHash, expectation: &TransferExpectation) -> ChainResult<VerificationResult> {
        let result = self.evaluate(tx_hash, expectation).await;
        match &result {
            Ok(verdict) => {
                metrics::record_verification(verdict.outcome());
                info!(
                    tx_hash = %tx_hash,
                    recipient = %expectation.recipient,
                    outcome = verdict.outcome(),
                    "Payment verified"
                );
            }
            Err(e) => {
                metrics::record_verification("error");
                warn!(tx_hash = %tx_hash, error = %e, "Payment verification failed");
            }
        }
        result
    }

    async fn evaluate(&self, tx_hash: TxHash, expectation: &TransferExpectation) -> ChainResult<VerificationResult> {
        let client = &self.client;
        let receipt = match retry_transient(&self.retry, "receipt", || client.receipt(tx_hash)).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return Ok(VerificationResult::NotFound),
            Err(ChainError::MalformedResponse(reason)) => {
                warn!(tx_hash = %tx_hash, reason, "Malformed receipt, treating as not found");
                return Ok(VerificationResult::NotFound);
            }
            Err(e) => return Err(e),
        };

        if !receipt.success {
            return Ok(VerificationResult::Reverted);
        }
        let block_number = receipt.block_number.unwrap_or_default();

        let transfers = match expectation.token {
            Token::Native => {
                let tx = match retry_transient(&self.retry, "transaction", || client.transaction(tx_hash)).await {
                    Ok(Some(tx)) => tx,
                    Ok(None) => return Ok(VerificationResult::NotFound),
                    Err(ChainError::MalformedResponse(reason)) => {
                        warn!(tx_hash = %tx_hash, reason, "Malformed transaction, treating as not found");
                        return Ok(VerificationResult::NotFound);
                    }
                    Err(e) => return Err(e),
                };
                // Contract creations have no recipient and can never match.
                tx.to
                    .map(|to| DecodedTransfer {
                        from: tx.from,
                        to,
                        value: tx.value,
                        log_index: None,
                        tx_hash: Some(tx.hash),
                        block_number: tx.block_number.or(receipt.block_number),
                    })
                    .into_iter()
                    .collect::<Vec<_>>()
            }
            Token::Erc20(contract) => decode_transfer_logs(&receipt.logs, contract),
        };
        debug!(tx_hash = %tx_hash, transfers = transfers.len(), "Decoded transfers");

        // Address equality is byte-wise, so checksum casing never matters here.
        let Some(transfer) = transfers.into_iter().find(|t| t.to == expectation.recipient) else {
            return Ok(VerificationResult::RecipientMismatch);
        };

        judge_amount(
            transfer.value,
            expectation.min_amount,
            expectation.decimals,
            |amount| VerificationResult::Confirmed {
                amount,
                from: transfer.from,
                to: transfer.to,
                block_number,
            },
        )
    }
}

/// Compare in raw units; the reported amount is display-only and never fails.
fn judge_amount(
    value: U256,
    expected: Decimal,
    decimals: u8,
    confirmed: impl FnOnce(Decimal) -> VerificationResult,
) -> ChainResult<VerificationResult> {
    let minimum = expected.max(Decimal::ZERO) * (Decimal::ONE - AMOUNT_TOLERANCE);
    let threshold = units::to_raw_ceil(minimum, decimals)?;
    let actual = units::to_decimal_saturating(value, decimals);
    if value < threshold {
        Ok(VerificationResult::AmountMismatch { expected, actual })
    } else {
        Ok(confirmed(actual))
    }
}
