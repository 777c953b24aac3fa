//! # flag-relay
//!
//! Multi-tenant feature-flag relay: per-tenant flag engines, live change
//! broadcast to connected clients, and change notifications to chat and
//! webhook backends.
//!
//! ## Overview
//!
//! `flag-relay` routes each API key to an isolated *flagset* (tenant):
//! - A [`TenantRegistry`](tenant::TenantRegistry) builds one engine per
//!   flagset from [`RelaySettings`](settings::RelaySettings) and routes keys
//!   to it with lock-free lookups
//! - A reload loop per flagset computes a [`ChangeSet`](changes::ChangeSet)
//!   whenever the flags drift
//! - Each change set fans out to the flagset's notifiers: live connections,
//!   Slack, Discord, Microsoft Teams, generic webhooks and metrics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flag_relay::prelude::*;
//! use flag_relay::tenant::{EngineSettings, FlagEngine, MemoryEngine};
//! use std::sync::Arc;
//!
//! # async fn example() -> flag_relay::error::Result<()> {
//! let settings = SettingsLoader::new()
//!     .with_file("config/relay.yaml")
//!     .with_env_overrides(ENV_PREFIX, ENV_SEPARATOR)
//!     .load()?;
//!
//! let registry = TenantRegistry::builder()
//!     .with_engine_factory(|_: &EngineSettings| -> Result<Arc<dyn FlagEngine>> {
//!         Ok(Arc::new(MemoryEngine::new()))
//!     })
//!     .build(&settings)?;
//! registry.start_polling();
//!
//! let tenant = registry.resolve("team-a-key")?;
//! println!("serving flagset {}", tenant.name());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `yaml`, `toml`, `json`: settings file formats (all enabled by default)
//! - `metrics`: OpenTelemetry counters for every change set (enabled by default)

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod changes;
pub mod connections;
pub mod error;
pub mod notifier;
pub mod settings;
pub mod tenant;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::changes::{ChangeSet, FlagSnapshot};
    pub use crate::connections::{Connection, ConnectionRegistry};
    pub use crate::error::{DeliveryError, RelayError, Result};
    pub use crate::notifier::{FanoutReport, Notifier};
    pub use crate::settings::{ENV_PREFIX, ENV_SEPARATOR, RelaySettings, SettingsLoader, Validate};
    pub use crate::tenant::{FlagEngine, Tenant, TenantRegistry};
}
