//! The evaluation-engine seam.
//!
//! Retrieving flags from storage and evaluating rules happen outside this
//! crate. The registry only needs to build one engine per tenant, ask it for
//! its current flags, and release it on shutdown.

use crate::changes::FlagSnapshot;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// What a factory receives to build one tenant's engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Flagset the engine serves
    pub flagset: String,
    /// Flag sources, as found in the settings
    pub retrievers: Vec<serde_json::Value>,
    /// Reload interval
    pub poll_interval: Duration,
}

/// A tenant's flag evaluation engine.
#[async_trait]
pub trait FlagEngine: Send + Sync {
    /// Fetch the tenant's current flags from its sources.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Engine` when the sources cannot be read; the reload
    /// loop keeps the previous snapshot in that case.
    async fn load_flags(&self) -> Result<FlagSnapshot>;

    /// Release the engine's resources. Called once per engine at shutdown or
    /// when a reload replaces it; must tolerate repeated calls.
    fn close(&self);
}

/// Builds engines from settings.
///
/// Closures of the right shape implement this trait, which keeps test setups
/// short.
pub trait EngineFactory: Send + Sync {
    /// Build the engine for one tenant.
    ///
    /// # Errors
    ///
    /// Any error drops only that tenant.
    fn build(&self, settings: &EngineSettings) -> Result<Arc<dyn FlagEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn(&EngineSettings) -> Result<Arc<dyn FlagEngine>> + Send + Sync,
{
    fn build(&self, settings: &EngineSettings) -> Result<Arc<dyn FlagEngine>> {
        self(settings)
    }
}

/// An engine holding its flags in memory.
///
/// Useful for embedding and tests: flags are replaced with
/// [`set_flags`](MemoryEngine::set_flags) and picked up by the next reload.
///
/// # Examples
///
/// ```rust
/// use flag_relay::tenant::{FlagEngine, MemoryEngine};
/// use serde_json::json;
///
/// # async fn example() -> flag_relay::error::Result<()> {
/// let engine = MemoryEngine::new();
/// engine.set_flags([("banner".to_string(), json!({"disable": false}))].into());
///
/// assert_eq!(engine.load_flags().await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngine {
    flags: RwLock<FlagSnapshot>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl MemoryEngine {
    /// Create an engine with no flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole flag snapshot.
    pub fn set_flags(&self, flags: FlagSnapshot) {
        *self.flags.write() = flags;
    }

    /// Make subsequent loads fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Whether [`close`](FlagEngine::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlagEngine for MemoryEngine {
    async fn load_flags(&self) -> Result<FlagSnapshot> {
        if self.is_closed() {
            return Err(RelayError::Engine("engine is closed".to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::Engine("flag source unavailable".to_string()));
        }
        Ok(self.flags.read().clone())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_engine_lifecycle() {
        let engine = MemoryEngine::new();
        assert!(engine.load_flags().await.unwrap().is_empty());

        engine.set_flags([("a".to_string(), json!(1))].into());
        assert_eq!(engine.load_flags().await.unwrap().len(), 1);

        engine.set_failing(true);
        assert!(engine.load_flags().await.is_err());
        engine.set_failing(false);

        engine.close();
        engine.close();
        assert!(engine.is_closed());
        assert!(engine.load_flags().await.is_err());
    }

    #[test]
    fn test_closure_factory() {
        let factory = |settings: &EngineSettings| -> Result<Arc<dyn FlagEngine>> {
            if settings.retrievers.is_empty() {
                return Err(RelayError::Engine("no retrievers".to_string()));
            }
            Ok(Arc::new(MemoryEngine::new()))
        };

        let mut settings = EngineSettings {
            flagset: "default".to_string(),
            retrievers: Vec::new(),
            poll_interval: Duration::from_secs(60),
        };
        assert!(factory.build(&settings).is_err());

        settings.retrievers.push(json!({"kind": "file"}));
        assert!(factory.build(&settings).is_ok());
    }
}
