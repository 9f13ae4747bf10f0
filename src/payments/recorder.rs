//! Consumer side of the observed-transfer channel.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::payments::types::TransferObserved;
use crate::resilience::calculate_backoff;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("donation store unavailable: {0}")]
    Unavailable(String),

    #[error("rejected donation: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// The transaction was already recorded.
    Duplicate,
}

/// Persists observed transfers. Must be idempotent on `tx_hash`.
#[async_trait]
pub trait DonationRecorder: Send + Sync {
    async fn record(&self, event: &TransferObserved) -> Result<RecordOutcome, RecorderError>;
}

/// First delay before retrying an unavailable store.
const RETRY_BASE_MS: u64 = 250;
const RETRY_MAX_MS: u64 = 30_000;

/// Drain `events` into `recorder` until the channel closes or `shutdown` fires.
///
/// While the store is unavailable the current event is retried with backoff, so the
/// listener's at-least-once delivery carries through to storage. Rejected events are
/// dropped. On shutdown, events already buffered get one attempt each.
pub async fn run_recorder<R>(
    mut events: mpsc::Receiver<TransferObserved>,
    recorder: Arc<R>,
    mut shutdown: broadcast::Receiver<()>,
) where
    R: DonationRecorder + ?Sized,
{
    let mut stopping = false;
    while !stopping {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => stopping = deliver(recorder.as_ref(), &event, &mut shutdown).await,
                None => break,
            },
            _ = shutdown.recv() => stopping = true,
        }
    }

    if stopping {
        events.close();
        while let Some(event) = events.recv().await {
            if let Err(e) = record_one(recorder.as_ref(), &event).await {
                error!(tx_hash = %event.tx_hash, error = %e, "Donation lost at shutdown");
            }
        }
    }
    info!("Donation recorder stopped");
}

/// Record `event`, retrying while the store is unavailable.
///
/// Returns `true` if shutdown fired while waiting.
async fn deliver<R: DonationRecorder + ?Sized>(
    recorder: &R,
    event: &TransferObserved,
    shutdown: &mut broadcast::Receiver<()>,
) -> bool {
    let mut attempt = 0u32;
    loop {
        let Err(e) = record_one(recorder, event).await else {
            return false;
        };
        attempt += 1;
        let delay = calculate_backoff(attempt, RETRY_BASE_MS, RETRY_MAX_MS);
        warn!(
            tx_hash = %event.tx_hash,
            error = %e,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Donation store unavailable, retrying"
        );
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.recv() => {
                if let Err(e) = record_one(recorder, event).await {
                    error!(tx_hash = %event.tx_hash, error = %e, "Donation lost at shutdown");
                }
                return true;
            }
        }
    }
}

/// One attempt. Only [`RecorderError::Unavailable`] is handed back for retry.
async fn record_one<R: DonationRecorder + ?Sized>(recorder: &R, event: &TransferObserved) -> Result<(), RecorderError> {
    match recorder.record(event).await {
        Ok(RecordOutcome::Inserted) => info!(
            entity = %event.entity_id,
            tx_hash = %event.tx_hash,
            amount = %event.amount,
            "Donation recorded"
        ),
        Ok(RecordOutcome::Duplicate) => debug!(tx_hash = %event.tx_hash, "Donation already recorded"),
        Err(e @ RecorderError::Unavailable(_)) => return Err(e),
        Err(e @ RecorderError::Rejected(_)) => {
            error!(tx_hash = %event.tx_hash, error = %e, "Donation rejected, dropping")
        }
    }
    Ok(())
}
