//! Discord webhook payloads.

use super::{ChatEntry, ChatProvider, header};
use serde_json::{Value, json};

/// Renders entries as Discord embeds, one per flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscordProvider;

impl ChatProvider for DiscordProvider {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn payload(&self, flagset: &str, entries: &[ChatEntry]) -> Value {
        let embeds: Vec<Value> = entries
            .iter()
            .map(|entry| {
                let fields: Vec<Value> = entry
                    .fields
                    .iter()
                    .map(|field| json!({ "name": field.path, "value": field.summary() }))
                    .collect();

                json!({
                    "title": entry.title(),
                    "color": entry.action.color(),
                    "fields": fields,
                })
            })
            .collect();

        json!({
            "content": header(flagset),
            "embeds": embeds,
        })
    }
}
