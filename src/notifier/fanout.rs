//! Per-tenant fan-out of change sets to every configured notifier.

use super::Notifier;
use crate::changes::ChangeSet;
use crate::error::DeliveryError;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A notifier that failed during one fan-out pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierFailure {
    /// Name of the failing notifier
    pub notifier: String,
    /// Why it failed
    pub error: DeliveryError,
}

/// Outcome of one fan-out pass. Failures are informational, never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Number of notifiers invoked
    pub invoked: usize,
    /// Notifiers that failed
    pub failures: Vec<NotifierFailure>,
}

impl FanoutReport {
    /// True when every notifier succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The set of notifiers configured for one tenant.
///
/// Each [`notify`](NotifierFanout::notify) call runs every notifier as its own
/// task, so a slow, failing or panicking notifier never prevents the others
/// from running. No ordering is guaranteed between notifiers.
///
/// # Examples
///
/// ```rust,no_run
/// use flag_relay::changes::ChangeSet;
/// use flag_relay::connections::ConnectionRegistry;
/// use flag_relay::notifier::{BroadcastNotifier, NotifierFanout};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let connections = ConnectionRegistry::new();
/// let fanout = NotifierFanout::new("default")
///     .with_notifier(Arc::new(BroadcastNotifier::new(connections)));
///
/// let report = fanout.notify(&ChangeSet::new()).await;
/// assert!(report.is_success());
/// # }
/// ```
#[derive(Clone)]
pub struct NotifierFanout {
    flagset: String,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierFanout {
    /// Create an empty fan-out for `flagset`.
    pub fn new(flagset: impl Into<String>) -> Self {
        Self {
            flagset: flagset.into(),
            notifiers: Vec::new(),
        }
    }

    /// Add a notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Add a notifier in place.
    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Number of configured notifiers.
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// True when no notifier is configured.
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Names of the configured notifiers, in configuration order.
    pub fn names(&self) -> Vec<String> {
        self.notifiers.iter().map(|n| n.name().to_string()).collect()
    }

    /// Deliver `changes` to every notifier and wait for all of them.
    #[instrument(skip_all, fields(flagset = %self.flagset, changes = changes.len()))]
    pub async fn notify(&self, changes: &ChangeSet) -> FanoutReport {
        let shared = Arc::new(changes.clone());

        let runs: Vec<_> = self
            .notifiers
            .iter()
            .map(|notifier| {
                let notifier = Arc::clone(notifier);
                let name = notifier.name().to_string();
                let changes = Arc::clone(&shared);
                let handle = tokio::spawn(async move { notifier.notify(&changes).await });
                (name, handle)
            })
            .collect();

        let mut report = FanoutReport {
            invoked: runs.len(),
            failures: Vec::new(),
        };

        for (name, handle) in runs {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(DeliveryError::Panicked(e.to_string())),
            };

            if let Err(error) = outcome {
                warn!(notifier = %name, error = %error, "Notifier failed");
                report.failures.push(NotifierFailure { notifier: name, error });
            }
        }

        debug!(
            invoked = report.invoked,
            failed = report.failures.len(),
            "Fan-out finished"
        );
        report
    }
}

impl std::fmt::Debug for NotifierFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierFanout")
            .field("flagset", &self.flagset)
            .field("notifiers", &self.names())
            .finish()
    }
}
