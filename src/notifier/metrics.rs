//! Change-set metrics using OpenTelemetry.

use super::Notifier;
use crate::changes::ChangeSet;
use crate::error::DeliveryError;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Meter};

/// Turns change sets into counter increments.
///
/// For every non-empty change set it records one `flag_relay.flags.changed`
/// increment and one per-flag increment of `flag_relay.flag.created`,
/// `flag_relay.flag.deleted` or `flag_relay.flag.updated`, labelled with
/// `flag_name`. All measurements carry a `flagset` attribute. Empty change
/// sets are skipped.
///
/// # Examples
///
/// ```rust,no_run
/// use flag_relay::notifier::MetricsNotifier;
/// use opentelemetry::global;
///
/// let meter = global::meter("flag-relay");
/// let metrics = MetricsNotifier::new(meter, "default");
/// ```
#[derive(Clone)]
pub struct MetricsNotifier {
    flagset: String,
    flags_changed: Counter<u64>,
    flag_created: Counter<u64>,
    flag_deleted: Counter<u64>,
    flag_updated: Counter<u64>,
}

impl MetricsNotifier {
    /// Create a metrics notifier for `flagset` with the provided meter.
    pub fn new(meter: Meter, flagset: impl Into<String>) -> Self {
        let flags_changed = meter
            .u64_counter("flag_relay.flags.changed")
            .with_description("Number of reloads that changed at least one flag")
            .build();

        let flag_created = meter
            .u64_counter("flag_relay.flag.created")
            .with_description("Number of flags created")
            .build();

        let flag_deleted = meter
            .u64_counter("flag_relay.flag.deleted")
            .with_description("Number of flags deleted")
            .build();

        let flag_updated = meter
            .u64_counter("flag_relay.flag.updated")
            .with_description("Number of flags updated")
            .build();

        Self {
            flagset: flagset.into(),
            flags_changed,
            flag_created,
            flag_deleted,
            flag_updated,
        }
    }

    fn record_flag(&self, counter: &Counter<u64>, flag: &str) {
        counter.add(
            1,
            &[
                KeyValue::new("flagset", self.flagset.clone()),
                KeyValue::new("flag_name", flag.to_string()),
            ],
        );
    }

    /// Record every counter for one change set. Returns false when it was empty.
    pub fn record(&self, changes: &ChangeSet) -> bool {
        if changes.is_empty() {
            return false;
        }

        self.flags_changed
            .add(1, &[KeyValue::new("flagset", self.flagset.clone())]);

        for flag in changes.added().keys() {
            self.record_flag(&self.flag_created, flag);
        }
        for flag in changes.deleted().keys() {
            self.record_flag(&self.flag_deleted, flag);
        }
        for flag in changes.updated().keys() {
            self.record_flag(&self.flag_updated, flag);
        }
        true
    }
}

#[async_trait]
impl Notifier for MetricsNotifier {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn notify(&self, changes: &ChangeSet) -> Result<(), DeliveryError> {
        self.record(changes);
        Ok(())
    }
}
