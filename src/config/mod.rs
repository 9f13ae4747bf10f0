//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!
//! settings store (database table or settings file)
//!     → settings.rs (SettingsStore trait)
//!     → provider.rs (merge with env + literals, cache for a freshness window)
//!     → NetworkConfig snapshots handed to chain clients
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Network endpoints are resolved at runtime so operators can rotate RPC URLs
//!   without a restart

pub mod loader;
pub mod provider;
pub mod schema;
pub mod settings;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use provider::{NetworkConfig, NetworkConfigProvider, DEFAULT_CACHE_TTL};
pub use schema::{AdminConfig, CampaignConfig, EngineConfig, MonitorConfig, ObservabilityConfig, VerificationConfig};
pub use settings::{EmptySettingsStore, FileSettingsStore, NetworkFee, SettingsError, SettingsStore};
