//! Generic JSON webhook notifier.

use super::{HttpPoster, Notifier};
use crate::changes::ChangeSet;
use crate::error::DeliveryError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Body posted to a webhook endpoint.
#[derive(Serialize)]
struct WebhookPayload<'a> {
    meta: &'a BTreeMap<String, String>,
    flags: &'a ChangeSet,
}

/// Posts the raw change set, plus free-form metadata, to an HTTP endpoint.
///
/// The body has the shape `{"meta": {...}, "flags": <change set>}`. The
/// `flagset` metadata entry is always present. When the poster has a secret,
/// the body is signed in the `X-Hub-Signature-256` header.
pub struct WebhookNotifier {
    poster: HttpPoster,
    meta: BTreeMap<String, String>,
}

impl WebhookNotifier {
    /// Create a webhook notifier for `flagset`.
    pub fn new(poster: HttpPoster, flagset: &str) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert("flagset".to_string(), flagset.to_string());
        Self { poster, meta }
    }

    /// Merge extra metadata into every payload. The `flagset` entry cannot be overridden.
    pub fn with_meta(mut self, meta: BTreeMap<String, String>) -> Self {
        for (key, value) in meta {
            self.meta.entry(key).or_insert(value);
        }
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, changes: &ChangeSet) -> Result<(), DeliveryError> {
        debug!(url = self.poster.url(), changes = changes.len(), "Posting webhook");
        self.poster
            .post_json(&WebhookPayload {
                meta: &self.meta,
                flags: changes,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_shape() {
        let poster = HttpPoster::builder().with_url("https://example.com").build().unwrap();
        let notifier = WebhookNotifier::new(poster, "team-a").with_meta(BTreeMap::from([
            ("env".to_string(), "prod".to_string()),
            ("flagset".to_string(), "spoofed".to_string()),
        ]));

        let mut changes = ChangeSet::new();
        changes.add("f", json!(true));

        let payload = serde_json::to_value(WebhookPayload {
            meta: &notifier.meta,
            flags: &changes,
        })
        .unwrap();

        assert_eq!(payload["meta"], json!({"env": "prod", "flagset": "team-a"}));
        assert_eq!(payload["flags"]["added"]["f"], json!(true));
    }
}
