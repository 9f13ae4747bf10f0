//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Settings store → Network config provider → Engine → Ledger
//!     → Platform listener → Campaign listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Stop listeners → Drain recorder → Save ledger
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: configuration and engine construction errors are fatal
//! - Listener startup failures are logged, never fatal
//! - Recorder drains buffered events before the ledger is saved

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{bootstrap, resume_listeners, Services, StartupError};
