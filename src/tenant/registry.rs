//! Registry routing API keys to isolated per-tenant engines.

use super::{EngineFactory, EngineSettings, FlagEngine, ReloadLoop, Tenant};
use crate::changes::ChangeSet;
use crate::connections::ConnectionRegistry;
use crate::error::{RelayError, Result};
use crate::notifier::{self, BroadcastNotifier, FanoutReport, NotifierFanout};
use crate::settings::{NotifierSettings, RelaySettings, Validate};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(feature = "metrics")]
use crate::notifier::MetricsNotifier;
#[cfg(feature = "metrics")]
use opentelemetry::metrics::Meter;

/// Name of the implicit tenant built from root-level settings.
pub const DEFAULT_FLAGSET: &str = "default";

/// Immutable routing table, replaced wholesale on reload.
struct TenantTable {
    tenants: HashMap<String, Arc<Tenant>>,
    keys: HashMap<String, Arc<Tenant>>,
    single_tenant: bool,
}

/// Everything needed to build one tenant, after name and fallbacks are resolved.
struct TenantPlan<'a> {
    name: String,
    api_keys: &'a [String],
    retrievers: &'a [serde_json::Value],
    notifiers: &'a [NotifierSettings],
    poll_interval: Duration,
}

/// Shared construction state used at build time and on every reload.
struct TableBuilder {
    factory: Arc<dyn EngineFactory>,
    #[cfg(feature = "metrics")]
    meter: Option<Meter>,
}

impl TableBuilder {
    fn build(&self, settings: &RelaySettings, previous: Option<&TenantTable>) -> Result<TenantTable> {
        let mut table = TenantTable {
            tenants: HashMap::new(),
            keys: HashMap::new(),
            single_tenant: settings.flagsets.is_empty(),
        };

        for tenant in &settings.flagsets {
            let name = unique_name(&tenant.name, &table.tenants);
            let retrievers = if tenant.retrievers.is_empty() {
                &settings.retrievers
            } else {
                &tenant.retrievers
            };
            let plan = TenantPlan {
                name,
                api_keys: &tenant.api_keys,
                retrievers,
                notifiers: &tenant.notifiers,
                poll_interval: tenant
                    .poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| settings.poll_interval()),
            };
            self.add(&mut table, plan, settings, previous);
        }

        let default_plan = TenantPlan {
            name: DEFAULT_FLAGSET.to_string(),
            api_keys: &settings.api_keys,
            retrievers: &settings.retrievers,
            notifiers: &settings.notifiers,
            poll_interval: settings.poll_interval(),
        };
        self.add(&mut table, default_plan, settings, previous);

        if table.tenants.is_empty() {
            error!("No flagset could be built, refusing to start");
            return Err(RelayError::Configuration(
                "no usable flagset: every configured flagset failed to build".to_string(),
            ));
        }

        Ok(table)
    }

    /// Build one tenant into `table`, or log and skip it.
    fn add(
        &self,
        table: &mut TenantTable,
        plan: TenantPlan<'_>,
        settings: &RelaySettings,
        previous: Option<&TenantTable>,
    ) {
        let name = plan.name.clone();
        match self.build_tenant(plan, table, settings, previous) {
            Ok(tenant) => {
                info!(
                    flagset = %tenant.name,
                    api_keys = tenant.api_keys.len(),
                    notifiers = tenant.fanout.len(),
                    "Flagset ready"
                );
                for key in &tenant.api_keys {
                    table.keys.insert(key.clone(), Arc::clone(&tenant));
                }
                table.tenants.insert(tenant.name.clone(), tenant);
            }
            Err(e) => {
                warn!(flagset = %name, error = %e, "Skipping flagset that failed to build");
            }
        }
    }

    fn build_tenant(
        &self,
        plan: TenantPlan<'_>,
        table: &TenantTable,
        settings: &RelaySettings,
        previous: Option<&TenantTable>,
    ) -> Result<Arc<Tenant>> {
        let mut api_keys: Vec<String> = Vec::with_capacity(plan.api_keys.len());
        for key in plan.api_keys {
            if table.keys.contains_key(key) {
                return Err(RelayError::Configuration(
                    "an API key is already assigned to another flagset".to_string(),
                ));
            }
            if !api_keys.contains(key) {
                api_keys.push(key.clone());
            }
        }

        // Live clients survive a reload of their flagset.
        let send_timeout = settings.connection_send_timeout();
        let connections = previous
            .and_then(|table| table.tenants.get(&plan.name))
            .map(|tenant| tenant.connections.with_shared_connections(send_timeout))
            .unwrap_or_else(|| ConnectionRegistry::with_send_timeout(send_timeout));

        let mut fanout = NotifierFanout::new(plan.name.clone())
            .with_notifier(Arc::new(BroadcastNotifier::new(connections.clone())));

        #[cfg(feature = "metrics")]
        {
            if let Some(meter) = &self.meter {
                fanout.push(Arc::new(MetricsNotifier::new(meter.clone(), plan.name.clone())));
            }
        }

        for notifier_settings in plan.notifiers {
            fanout.push(notifier::from_settings(notifier_settings, &plan.name)?);
        }

        // Built last so that an earlier failure never leaks an engine.
        let engine = self.factory.build(&EngineSettings {
            flagset: plan.name.clone(),
            retrievers: plan.retrievers.to_vec(),
            poll_interval: plan.poll_interval,
        })?;

        Ok(Arc::new(Tenant {
            name: plan.name,
            api_keys,
            engine,
            connections,
            fanout,
            poll_interval: plan.poll_interval,
            snapshot: Mutex::new(None),
        }))
    }
}

/// Close every engine and live connection of `table`.
fn close_table(table: &TenantTable) {
    for tenant in table.tenants.values() {
        tenant.engine.close();
        tenant.connections.close();
    }
}

/// Keep `requested` unless it is empty, reserved, or taken; otherwise generate one.
fn unique_name(requested: &str, taken: &HashMap<String, Arc<Tenant>>) -> String {
    if !requested.is_empty() && requested != DEFAULT_FLAGSET && !taken.contains_key(requested) {
        return requested.to_string();
    }

    loop {
        let generated = format!("flagset-{}", uuid::Uuid::new_v4());
        if !taken.contains_key(&generated) {
            info!(requested, generated = %generated, "Renamed flagset with an empty, reserved or duplicate name");
            return generated;
        }
    }
}

/// Routes API keys to tenants and owns every tenant's engine.
///
/// The routing table is published through `arc-swap`: [`resolve`] never takes
/// a lock, and [`reload`] replaces the whole table atomically.
///
/// A tenant named `default` is always attempted from the root-level settings.
/// With no explicit flagsets configured the registry runs in single-tenant
/// mode and every key, including the empty one, resolves to it.
///
/// # Examples
///
/// ```rust,no_run
/// use flag_relay::prelude::*;
/// use flag_relay::tenant::{EngineSettings, FlagEngine, MemoryEngine};
/// use std::sync::Arc;
///
/// # fn example(settings: RelaySettings) -> Result<()> {
/// let registry = TenantRegistry::builder()
///     .with_engine_factory(|_: &EngineSettings| -> Result<Arc<dyn FlagEngine>> {
///         Ok(Arc::new(MemoryEngine::new()))
///     })
///     .build(&settings)?;
///
/// let tenant = registry.resolve("api-key")?;
/// println!("routed to {}", tenant.name());
/// registry.close();
/// # Ok(())
/// # }
/// ```
///
/// [`resolve`]: TenantRegistry::resolve
/// [`reload`]: TenantRegistry::reload
pub struct TenantRegistry {
    table: ArcSwap<TenantTable>,
    builder: TableBuilder,
    pollers: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes table publication, poller startup and shutdown.
    lifecycle: Mutex<()>,
    polling: AtomicBool,
    reloading: AtomicBool,
    closed: AtomicBool,
}

impl TenantRegistry {
    /// Create a new builder.
    pub fn builder() -> TenantRegistryBuilder {
        TenantRegistryBuilder::new()
    }

    /// Route an API key to its tenant.
    ///
    /// # Errors
    ///
    /// - `RelayError::UnknownKey` in multi-tenant mode when no tenant lists the key
    /// - `RelayError::Closed` after [`close`](TenantRegistry::close)
    pub fn resolve(&self, api_key: &str) -> Result<Arc<Tenant>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::Closed);
        }

        let table = self.table.load();
        let tenant = if table.single_tenant {
            table.tenants.get(DEFAULT_FLAGSET)
        } else {
            table.keys.get(api_key)
        };
        tenant.cloned().ok_or(RelayError::UnknownKey)
    }

    /// Look up a tenant by name.
    pub fn tenant(&self, name: &str) -> Option<Arc<Tenant>> {
        self.table.load().tenants.get(name).cloned()
    }

    /// Every tenant's engine, keyed by flagset name.
    pub fn list_tenants(&self) -> HashMap<String, Arc<dyn FlagEngine>> {
        self.table
            .load()
            .tenants
            .iter()
            .map(|(name, tenant)| (name.clone(), Arc::clone(&tenant.engine)))
            .collect()
    }

    /// True when no explicit flagset is configured.
    pub fn is_single_tenant_mode(&self) -> bool {
        self.table.load().single_tenant
    }

    /// Deliver `changes` to every notifier of the named tenant.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::UnknownTenant` if no tenant has that name. Notifier
    /// failures are reported in the returned [`FanoutReport`], never as errors.
    pub async fn notify(&self, flagset: &str, changes: &ChangeSet) -> Result<FanoutReport> {
        let tenant = self
            .tenant(flagset)
            .ok_or_else(|| RelayError::UnknownTenant(flagset.to_string()))?;
        Ok(tenant.notify(changes).await)
    }

    /// Start one reload loop per tenant on the current tokio runtime.
    ///
    /// Calling it again while loops are running has no effect.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start_polling(&self) {
        let _lifecycle = self.lifecycle.lock();
        if self.closed.load(Ordering::Acquire) || self.polling.swap(true, Ordering::AcqRel) {
            return;
        }
        self.spawn_pollers();
    }

    fn spawn_pollers(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .table
            .load()
            .tenants
            .values()
            .map(|tenant| ReloadLoop::new(Arc::clone(tenant)).spawn())
            .collect();
        debug!(loops = handles.len(), "Reload loops started");
        self.pollers.lock().extend(handles);
    }

    fn abort_pollers(&self) {
        for handle in self.pollers.lock().drain(..) {
            handle.abort();
        }
    }

    /// Replace every tenant from new settings.
    ///
    /// The settings are validated first. Tenants whose name survives keep
    /// their live connections, which pick up the new send timeout, and their
    /// last flag snapshot, so drift between the replaced engine and the new one
    /// is fanned out on the next reload cycle. Engines of the replaced table
    /// are closed. If the new settings yield no usable tenant, the current
    /// table stays in place and the error is returned.
    ///
    /// When polling is active the reload loops are restarted for the new
    /// tenants, so the call must then happen inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `RelayError::Validation` if the settings are invalid
    /// - `RelayError::Configuration` if no tenant could be built or another
    ///   reload is in progress
    /// - `RelayError::Closed` after [`close`](TenantRegistry::close), including
    ///   a close that lands while the new tenants are being built
    pub fn reload(&self, settings: &RelaySettings) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::Closed);
        }
        settings.validate()?;
        if self.reloading.swap(true, Ordering::AcqRel) {
            return Err(RelayError::Configuration(
                "a reload is already in progress".to_string(),
            ));
        }

        let result = self.swap_table(settings);
        self.reloading.store(false, Ordering::Release);
        result
    }

    fn swap_table(&self, settings: &RelaySettings) -> Result<()> {
        let current = self.table.load_full();
        let next = self.builder.build(settings, Some(current.as_ref()))?;

        let _lifecycle = self.lifecycle.lock();
        if self.closed.load(Ordering::Acquire) {
            close_table(&next);
            return Err(RelayError::Closed);
        }

        let polling = self.polling.load(Ordering::Acquire);
        if polling {
            self.abort_pollers();
        }

        for (name, tenant) in &next.tenants {
            if let Some(previous) = current.tenants.get(name) {
                *tenant.snapshot.lock() = previous.snapshot();
            }
        }

        let flagsets = next.tenants.len();
        self.table.store(Arc::new(next));
        let table = self.table.load();
        for (name, tenant) in &current.tenants {
            tenant.engine.close();
            if !table.tenants.contains_key(name) {
                tenant.connections.close();
            }
        }

        if polling {
            self.spawn_pollers();
        }

        info!(flagsets, "Flagsets reloaded");
        Ok(())
    }

    /// Stop reload loops, close every engine and drop every live connection.
    ///
    /// Safe to call any number of times.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _lifecycle = self.lifecycle.lock();
        self.abort_pollers();
        close_table(&self.table.load());
        info!("Tenant registry closed");
    }
}

impl Drop for TenantRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TenantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.load();
        let mut names: Vec<&String> = table.tenants.keys().collect();
        names.sort();
        f.debug_struct("TenantRegistry")
            .field("flagsets", &names)
            .field("single_tenant", &table.single_tenant)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Builder for constructing a `TenantRegistry`.
pub struct TenantRegistryBuilder {
    factory: Option<Arc<dyn EngineFactory>>,
    #[cfg(feature = "metrics")]
    meter: Option<Meter>,
}

impl TenantRegistryBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            factory: None,
            #[cfg(feature = "metrics")]
            meter: None,
        }
    }

    /// Set the factory that builds each tenant's engine.
    pub fn with_engine_factory<F: EngineFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Record change-set metrics for every tenant with this meter.
    #[cfg(feature = "metrics")]
    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Validate `settings` and build every tenant they describe.
    ///
    /// Tenants that fail to build are logged and skipped.
    ///
    /// # Errors
    ///
    /// - `RelayError::Validation` if the settings are invalid
    /// - `RelayError::Configuration` if no engine factory was provided or no
    ///   tenant at all could be built
    pub fn build(self, settings: &RelaySettings) -> Result<TenantRegistry> {
        settings.validate()?;
        let factory = self.factory.ok_or_else(|| {
            RelayError::Configuration("an engine factory is required".to_string())
        })?;

        let builder = TableBuilder {
            factory,
            #[cfg(feature = "metrics")]
            meter: self.meter,
        };
        let table = builder.build(settings, None)?;

        Ok(TenantRegistry {
            table: ArcSwap::from_pointee(table),
            builder,
            pollers: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(()),
            polling: AtomicBool::new(false),
            reloading: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }
}

impl Default for TenantRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TenantSettings;
    use crate::tenant::MemoryEngine;
    use serde_json::json;

    fn factory(settings: &EngineSettings) -> Result<Arc<dyn FlagEngine>> {
        if settings.retrievers.is_empty() {
            return Err(RelayError::Engine("no retrievers configured".to_string()));
        }
        Ok(Arc::new(MemoryEngine::new()))
    }

    fn flagset(name: &str, keys: &[&str]) -> TenantSettings {
        TenantSettings {
            name: name.to_string(),
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..TenantSettings::default()
        }
    }

    fn root(flagsets: Vec<TenantSettings>) -> RelaySettings {
        RelaySettings {
            retrievers: vec![json!({"kind": "file", "path": "flags.yaml"})],
            flagsets,
            ..RelaySettings::default()
        }
    }

    fn build(settings: &RelaySettings) -> Result<TenantRegistry> {
        TenantRegistry::builder().with_engine_factory(factory).build(settings)
    }

    #[test]
    fn test_unique_name_rules() {
        let mut taken = HashMap::new();
        assert_eq!(unique_name("team-a", &taken), "team-a");
        assert!(unique_name("", &taken).starts_with("flagset-"));
        assert!(unique_name(DEFAULT_FLAGSET, &taken).starts_with("flagset-"));

        let registry = build(&root(vec![])).unwrap();
        taken.insert("team-a".to_string(), registry.tenant(DEFAULT_FLAGSET).unwrap());
        assert_ne!(unique_name("team-a", &taken), "team-a");
    }

    #[test]
    fn test_single_tenant_fallback() {
        let registry = build(&root(vec![])).unwrap();

        assert!(registry.is_single_tenant_mode());
        assert_eq!(registry.list_tenants().len(), 1);
        assert_eq!(registry.resolve("").unwrap().name(), DEFAULT_FLAGSET);
        assert_eq!(registry.resolve("anything").unwrap().name(), DEFAULT_FLAGSET);
    }

    #[test]
    fn test_missing_factory_is_configuration_error() {
        let result = TenantRegistry::builder().build(&root(vec![]));
        assert!(matches!(result, Err(RelayError::Configuration(_))));
    }

    #[test]
    fn test_zero_tenants_fails_closed() {
        let settings = RelaySettings::default();
        let result = build(&settings);
        assert!(matches!(result, Err(RelayError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_key_drops_later_tenant() {
        let settings = root(vec![flagset("a", &["shared"]), flagset("b", &["shared", "own"])]);
        let registry = build(&settings).unwrap();

        assert!(registry.tenant("a").is_some());
        assert!(registry.tenant("b").is_none());
        assert!(matches!(registry.resolve("own"), Err(RelayError::UnknownKey)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = build(&root(vec![])).unwrap();
        registry.close();
        registry.close();
        assert!(matches!(registry.resolve(""), Err(RelayError::Closed)));
    }
}
