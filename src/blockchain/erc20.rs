//! ERC-20 Transfer event decoding.

use alloy::primitives::Address;
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;

use crate::blockchain::types::DecodedTransfer;

sol! {
    /// Emitted by ERC-20 contracts whenever value moves.
    #[derive(Debug)]
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Decode every Transfer emitted by `token` in `logs`.
///
/// Logs from other contracts, other events, and anything that fails to decode are
/// skipped. Receipts routinely carry unrelated logs.
pub fn decode_transfer_logs(logs: &[Log], token: Address) -> Vec<DecodedTransfer> {
    logs.iter()
        .filter(|log| log.inner.address == token)
        .filter_map(|log| match log.log_decode::<Transfer>() {
            Ok(decoded) => {
                let event = decoded.inner.data;
                Some(DecodedTransfer {
                    from: event.from,
                    to: event.to,
                    value: event.value,
                    log_index: log.log_index,
                    tx_hash: log.transaction_hash,
                    block_number: log.block_number,
                })
            }
            Err(e) => {
                tracing::trace!(
                    token = %token,
                    log_index = ?log.log_index,
                    error = %e,
                    "Skipping log that is not a Transfer"
                );
                None
            }
        })
        .collect()
}

/// Log filter matching Transfers of `token` into `recipient`.
pub fn transfer_filter(token: Address, recipient: Address) -> Filter {
    Filter::new()
        .address(token)
        .event_signature(Transfer::SIGNATURE_HASH)
        .topic2(recipient.into_word())
}
