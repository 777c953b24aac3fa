//! Relay settings: root sources, API keys, notifiers and flagsets.

use super::Validate;
use crate::connections::DEFAULT_SEND_TIMEOUT;
use crate::error::ValidationError;
use crate::notifier::http::DEFAULT_HTTP_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default interval between two reloads of a tenant's flags.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest accepted reload interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Top-level relay settings.
///
/// Root-level `retrievers`, `api_keys` and `notifiers` describe the implicit
/// `default` flagset. Each entry of `flagsets` describes one explicit tenant;
/// a flagset without retrievers of its own uses the root retrievers.
///
/// # Examples
///
/// ```rust
/// use flag_relay::settings::RelaySettings;
///
/// let settings: RelaySettings = serde_json::from_value(serde_json::json!({
///     "retrievers": [{"kind": "file", "path": "flags.yaml"}],
///     "flagsets": [
///         {"name": "team-a", "api_keys": ["key-a"]}
///     ]
/// })).unwrap();
///
/// assert_eq!(settings.flagsets.len(), 1);
/// assert_eq!(settings.poll_interval_ms, 60_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Flag sources for the default flagset; opaque to the relay
    pub retrievers: Vec<serde_json::Value>,
    /// API keys of the default flagset
    pub api_keys: Vec<String>,
    /// Reload interval in milliseconds
    pub poll_interval_ms: u64,
    /// Deadline for one send to a live connection, in milliseconds
    pub connection_send_timeout_ms: u64,
    /// Notifiers of the default flagset
    pub notifiers: Vec<NotifierSettings>,
    /// Explicit tenants
    pub flagsets: Vec<TenantSettings>,
}

impl RelaySettings {
    /// Reload interval of the default flagset.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-connection send deadline.
    pub fn connection_send_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_send_timeout_ms)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            retrievers: Vec::new(),
            api_keys: Vec::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            connection_send_timeout_ms: DEFAULT_SEND_TIMEOUT.as_millis() as u64,
            notifiers: Vec::new(),
            flagsets: Vec::new(),
        }
    }
}

/// One explicit tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantSettings {
    /// Flagset name; empty or `default` is replaced by a generated name
    pub name: String,
    /// API keys routed to this flagset; unique across all flagsets
    pub api_keys: Vec<String>,
    /// Flag sources; empty means "use the root retrievers"
    pub retrievers: Vec<serde_json::Value>,
    /// Notifiers of this flagset
    pub notifiers: Vec<NotifierSettings>,
    /// Reload interval in milliseconds; falls back to the root interval
    pub poll_interval_ms: Option<u64>,
}

/// Chat or webhook backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    /// Slack incoming webhook
    Slack,
    /// Discord webhook
    Discord,
    /// Microsoft Teams connector
    MicrosoftTeams,
    /// Generic JSON webhook
    Webhook,
}

/// One HTTP-backed notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Backend type
    pub kind: NotifierKind,
    /// Endpoint URL
    pub url: String,
    /// Shared secret used to sign request bodies
    #[serde(default)]
    pub secret: Option<String>,
    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Extra payload metadata (webhook only)
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Request timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl NotifierSettings {
    /// Request timeout, defaulting to 10 seconds.
    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT)
    }
}

fn check_interval(field: String, interval_ms: u64, errors: &mut Vec<ValidationError>) {
    if Duration::from_millis(interval_ms) < MIN_POLL_INTERVAL {
        errors.push(ValidationError::invalid_field(
            field,
            format!("must be at least {} ms", MIN_POLL_INTERVAL.as_millis()),
        ));
    }
}

fn check_notifiers(prefix: &str, notifiers: &[NotifierSettings], errors: &mut Vec<ValidationError>) {
    for (index, notifier) in notifiers.iter().enumerate() {
        if !(notifier.url.starts_with("http://") || notifier.url.starts_with("https://")) {
            errors.push(ValidationError::invalid_field(
                format!("{}notifiers[{}].url", prefix, index),
                "must be an http(s) URL",
            ));
        }
        if notifier.timeout_ms == Some(0) {
            errors.push(ValidationError::invalid_field(
                format!("{}notifiers[{}].timeout_ms", prefix, index),
                "must be greater than 0",
            ));
        }
    }
}

impl Validate for RelaySettings {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        check_interval("poll_interval_ms".to_string(), self.poll_interval_ms, &mut errors);
        if self.connection_send_timeout_ms == 0 {
            errors.push(ValidationError::invalid_field(
                "connection_send_timeout_ms",
                "must be greater than 0",
            ));
        }
        check_notifiers("", &self.notifiers, &mut errors);

        for (index, tenant) in self.flagsets.iter().enumerate() {
            if let Some(interval) = tenant.poll_interval_ms {
                check_interval(format!("flagsets[{}].poll_interval_ms", index), interval, &mut errors);
            }
            check_notifiers(&format!("flagsets[{}].", index), &tenant.notifiers, &mut errors);
        }

        match ValidationError::from_list(errors) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
