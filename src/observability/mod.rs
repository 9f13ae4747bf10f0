//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Chain client, verifier, subscriptions, recorder produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
