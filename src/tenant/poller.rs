//! Timer-driven reload loop: one per tenant.

use super::Tenant;
use crate::changes::ChangeSet;
use crate::notifier::FanoutReport;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodically reloads a tenant's flags and fans out whatever changed.
///
/// The snapshot lives on the tenant. When the tenant has none yet, the first
/// successful load only seeds it. Every later load is compared with the
/// previous snapshot; a non-empty change set is delivered to the tenant's
/// notifiers. Load failures are logged and the previous snapshot is kept.
pub struct ReloadLoop {
    tenant: Arc<Tenant>,
}

impl ReloadLoop {
    /// Create a loop for `tenant`.
    pub fn new(tenant: Arc<Tenant>) -> Self {
        Self { tenant }
    }

    /// Run a single reload cycle.
    ///
    /// Returns the fan-out report when drift was detected and delivered.
    pub async fn tick(&mut self) -> Option<FanoutReport> {
        let current = match self.tenant.engine().load_flags().await {
            Ok(flags) => flags,
            Err(e) => {
                warn!(flagset = %self.tenant.name(), error = %e, "Flag reload failed, keeping previous snapshot");
                return None;
            }
        };

        let changes = {
            let mut previous = self.tenant.snapshot.lock();
            let changes = previous
                .as_ref()
                .map(|seen| ChangeSet::between(seen, &current));
            *previous = Some(current);
            changes
        };

        let Some(changes) = changes else {
            debug!(flagset = %self.tenant.name(), "Initial flag snapshot loaded");
            return None;
        };

        if changes.is_empty() {
            return None;
        }

        info!(
            flagset = %self.tenant.name(),
            added = changes.added().len(),
            deleted = changes.deleted().len(),
            updated = changes.updated().len(),
            "Flag changes detected"
        );
        Some(self.tenant.notify(&changes).await)
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// The first cycle runs immediately; later cycles follow the tenant's poll
    /// interval. Abort the returned handle to stop it.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tenant.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }
}
