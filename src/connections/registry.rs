//! Registry of live client connections with deadlock-free broadcast.

use crate::changes::ChangeSet;
use crate::error::DeliveryError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default deadline for a single connection send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// A live outbound channel to one client.
///
/// The registry only ever hands a connection a serialized message; how the
/// message travels (websocket frame, SSE event, ...) is up to the implementor.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Deliver one serialized message.
    ///
    /// # Errors
    ///
    /// Returns a `DeliveryError` when the message could not be delivered. The
    /// registry drops the connection afterwards.
    async fn send(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot taken at call entry
    pub attempted: usize,
    /// Successful deliveries
    pub delivered: usize,
    /// Failed deliveries; each of these connections was deregistered
    pub failed: usize,
}

type ConnectionKey = usize;

/// Identity of a connection is the address of its shared allocation.
fn key_of(conn: &Arc<dyn Connection>) -> ConnectionKey {
    Arc::as_ptr(conn) as *const () as usize
}

/// Registry of live connections for one tenant.
///
/// Registration and removal take a short write lock. [`broadcast`] copies the
/// live set under a read lock, releases it, and delivers outside any lock, so a
/// failed delivery can deregister its connection without deadlocking.
///
/// Clones share the same live set.
///
/// # Examples
///
/// ```rust,no_run
/// use flag_relay::changes::ChangeSet;
/// use flag_relay::connections::{Connection, ConnectionRegistry};
/// use flag_relay::error::DeliveryError;
/// use std::sync::Arc;
///
/// struct Stdout;
///
/// #[async_trait::async_trait]
/// impl Connection for Stdout {
///     async fn send(&self, message: &str) -> Result<(), DeliveryError> {
///         println!("{}", message);
///         Ok(())
///     }
/// }
///
/// # async fn example() {
/// let registry = ConnectionRegistry::new();
/// let conn: Arc<dyn Connection> = Arc::new(Stdout);
/// registry.register(Arc::clone(&conn));
///
/// let report = registry.broadcast(&ChangeSet::new()).await.unwrap();
/// assert_eq!(report.delivered, 1);
///
/// registry.deregister(&conn);
/// # }
/// ```
///
/// [`broadcast`]: ConnectionRegistry::broadcast
#[derive(Clone)]
pub struct ConnectionRegistry {
    live: Arc<RwLock<HashMap<ConnectionKey, Arc<dyn Connection>>>>,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    /// Create an empty registry with the default send timeout.
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// Create an empty registry with a custom per-connection send timeout.
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            live: Arc::new(RwLock::new(HashMap::new())),
            send_timeout,
        }
    }

    /// A registry sharing this one's live set, with its own send timeout.
    ///
    /// Registrations through either handle are visible to both.
    pub fn with_shared_connections(&self, send_timeout: Duration) -> Self {
        Self {
            live: Arc::clone(&self.live),
            send_timeout,
        }
    }

    /// Add a connection. Registering a connection twice keeps a single entry.
    pub fn register(&self, conn: Arc<dyn Connection>) {
        let key = key_of(&conn);
        let mut live = self.live.write();
        live.entry(key).or_insert(conn);
        debug!(connections = live.len(), "Connection registered");
    }

    /// Remove a connection if present.
    pub fn deregister(&self, conn: &Arc<dyn Connection>) {
        let mut live = self.live.write();
        if live.remove(&key_of(conn)).is_some() {
            debug!(connections = live.len(), "Connection deregistered");
        }
    }

    /// Whether the connection is currently registered.
    pub fn contains(&self, conn: &Arc<dyn Connection>) -> bool {
        self.live.read().contains_key(&key_of(conn))
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    /// True when no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }

    /// Per-connection send deadline.
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Deliver a change set to every connection live at call entry.
    ///
    /// The change set is serialized once and sent to each connection
    /// concurrently, each send bounded by the registry's send timeout.
    /// Connections whose delivery fails or times out are deregistered.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Encode` if the change set cannot be serialized;
    /// individual connection failures are reported in the returned
    /// [`BroadcastReport`] instead.
    #[instrument(skip_all, fields(changes = changes.len()))]
    pub async fn broadcast(&self, changes: &ChangeSet) -> Result<BroadcastReport, DeliveryError> {
        let message: Arc<str> = serde_json::to_string(changes)
            .map_err(|e| DeliveryError::Encode(e.to_string()))?
            .into();

        // The read guard is a temporary and is released at the end of this statement.
        let snapshot: Vec<Arc<dyn Connection>> = self.live.read().values().cloned().collect();

        let mut report = BroadcastReport {
            attempted: snapshot.len(),
            ..BroadcastReport::default()
        };

        let deliveries: Vec<_> = snapshot
            .into_iter()
            .map(|conn| {
                let task_conn = Arc::clone(&conn);
                let message = Arc::clone(&message);
                let deadline = self.send_timeout;
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(deadline, task_conn.send(&message)).await {
                        Ok(result) => result,
                        Err(_) => Err(DeliveryError::Timeout),
                    }
                });
                (conn, handle)
            })
            .collect();

        for (conn, handle) in deliveries {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(DeliveryError::Panicked(e.to_string())),
            };

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(error = %e, "Dropping connection after failed delivery");
                    report.failed += 1;
                    self.deregister(&conn);
                }
            }
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast finished"
        );
        Ok(report)
    }

    /// Drop every connection without notifying it.
    pub fn close(&self) {
        let mut live = self.live.write();
        let dropped = live.len();
        live.clear();
        debug!(dropped, "Connection registry closed");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}
