//! Multi-tenant flagsets: per-tenant engines, reload loops and the registry
//! that routes API keys to them.

mod engine;
mod handle;
mod poller;
mod registry;

pub use engine::{EngineFactory, EngineSettings, FlagEngine, MemoryEngine};
pub use handle::Tenant;
pub use poller::ReloadLoop;
pub use registry::{DEFAULT_FLAGSET, TenantRegistry, TenantRegistryBuilder};
