//! One tenant: its engine, live connections and notifiers.

use super::FlagEngine;
use crate::changes::{ChangeSet, FlagSnapshot};
use crate::connections::ConnectionRegistry;
use crate::notifier::{FanoutReport, NotifierFanout};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// An isolated flagset, owned by the [`TenantRegistry`](super::TenantRegistry).
///
/// Handles are shared as `Arc<Tenant>`; resolving the same key twice yields the
/// same handle until the registry is reloaded.
pub struct Tenant {
    pub(crate) name: String,
    pub(crate) api_keys: Vec<String>,
    pub(crate) engine: Arc<dyn FlagEngine>,
    pub(crate) connections: ConnectionRegistry,
    pub(crate) fanout: NotifierFanout,
    pub(crate) poll_interval: Duration,
    /// Flags seen by the last successful reload; carried across registry reloads.
    pub(crate) snapshot: Mutex<Option<FlagSnapshot>>,
}

impl Tenant {
    /// Flagset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// API keys routed to this tenant.
    pub fn api_keys(&self) -> &[String] {
        &self.api_keys
    }

    /// The tenant's evaluation engine.
    pub fn engine(&self) -> &Arc<dyn FlagEngine> {
        &self.engine
    }

    /// Live client connections of this tenant.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Notifiers of this tenant.
    pub fn fanout(&self) -> &NotifierFanout {
        &self.fanout
    }

    /// Interval of the tenant's reload loop.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Flags seen by the most recent successful reload, if any.
    pub fn snapshot(&self) -> Option<FlagSnapshot> {
        self.snapshot.lock().clone()
    }

    /// Run one fan-out pass for `changes`.
    pub async fn notify(&self, changes: &ChangeSet) -> FanoutReport {
        self.fanout.notify(changes).await
    }
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("name", &self.name)
            .field("api_keys", &self.api_keys.len())
            .field("connections", &self.connections.len())
            .field("fanout", &self.fanout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
