//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! RPC call from verifier or subscription:
//!     → blockchain::client (enforce per-call timeout, provider failover)
//!     → On transient failure: retries.rs (retry with backoff)
//!     → backoff.rs (exponential delay with jitter, also used for reconnects)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only transient errors (network, timeout) are retried
//! - Malformed responses are never retried blindly

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{retry_transient, RetryPolicy};
