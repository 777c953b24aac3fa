//! Notifier that pushes change sets to live client connections.

use super::Notifier;
use crate::changes::ChangeSet;
use crate::connections::ConnectionRegistry;
use crate::error::DeliveryError;
use async_trait::async_trait;

/// Forwards every change set to a tenant's [`ConnectionRegistry`].
///
/// Failures of individual connections are handled (and the connections
/// dropped) by the registry; only a failure to encode the change set is
/// reported as a notifier failure.
pub struct BroadcastNotifier {
    connections: ConnectionRegistry,
}

impl BroadcastNotifier {
    /// Create a notifier broadcasting to `connections`.
    pub fn new(connections: ConnectionRegistry) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn notify(&self, changes: &ChangeSet) -> Result<(), DeliveryError> {
        self.connections.broadcast(changes).await.map(|_| ())
    }
}
