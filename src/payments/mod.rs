//! Payment verification and wallet monitoring.
//!
//! # Data Flow
//! ```text
//! verify request ─▶ verifier.rs ─▶ ChainClient (receipt, tx) ─▶ VerificationResult
//!
//! start listener ─▶ supervisor.rs (one per entity)
//!                       └─▶ subscription.rs (WebSocket or HTTP polling task)
//!                               └─▶ mpsc<TransferObserved> ─▶ recorder.rs ─▶ ledger.rs
//! ```

pub mod ledger;
pub mod recorder;
pub mod subscription;
pub mod supervisor;
pub mod types;
pub mod verifier;

pub use ledger::{DonationLedger, DonationRecord};
pub use recorder::{run_recorder, DonationRecorder, RecordOutcome, RecorderError};
pub use subscription::{SubscriptionSettings, WalletSubscription};
pub use supervisor::SubscriptionSupervisor;
pub use types::{
    ConnectionKind, EntityId, MonitorError, MonitoredEntity, StartAllSummary, StartOutcome, StartStatus, StopStatus,
    SubscriptionHandle, SubscriptionStatus, TransferExpectation, TransferObserved, VerificationResult,
};
pub use verifier::TransferVerifier;
