//! Relay settings model, sources and loader.

mod loader;
mod model;
mod sources;
mod validation;

pub use loader::{ENV_PREFIX, ENV_SEPARATOR, SettingsLoader};
pub use model::{
    DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL, NotifierKind, NotifierSettings, RelaySettings, TenantSettings,
};
pub use sources::{EnvSource, FileSource, SettingsSource};
pub use validation::Validate;
