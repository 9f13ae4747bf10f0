//! Blockchain payment verification and wallet monitoring.

pub mod admin;
pub mod blockchain;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod observability;
pub mod payments;
pub mod resilience;

pub use config::schema::EngineConfig;
pub use engine::{ChainConnector, EngineError, EngineResult, PaymentEngine, RpcConnector};
pub use lifecycle::Shutdown;
