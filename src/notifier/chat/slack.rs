//! Slack incoming-webhook payloads.

use super::{ChatEntry, ChatProvider, header};
use serde_json::{Value, json};

/// Renders entries as Slack attachments, one per flag.
#[derive(Debug, Clone, Default)]
pub struct SlackProvider {
    icon_url: Option<String>,
}

impl SlackProvider {
    /// Use a custom bot icon instead of the webhook's default.
    pub fn with_icon_url(icon_url: impl Into<String>) -> Self {
        Self {
            icon_url: Some(icon_url.into()),
        }
    }
}

impl ChatProvider for SlackProvider {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn payload(&self, flagset: &str, entries: &[ChatEntry]) -> Value {
        let attachments: Vec<Value> = entries
            .iter()
            .map(|entry| {
                let fields: Vec<Value> = entry
                    .fields
                    .iter()
                    .map(|field| {
                        json!({
                            "title": field.path,
                            "value": field.summary(),
                            "short": false,
                        })
                    })
                    .collect();

                json!({
                    "title": entry.title(),
                    "color": format!("#{:06X}", entry.action.color()),
                    "fields": fields,
                })
            })
            .collect();

        let mut payload = json!({
            "text": header(flagset),
            "attachments": attachments,
        });
        if let Some(icon_url) = &self.icon_url {
            payload["icon_url"] = json!(icon_url);
        }
        payload
    }
}
