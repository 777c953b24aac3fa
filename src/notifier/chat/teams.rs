//! Microsoft Teams connector (MessageCard) payloads.

use super::{ChatEntry, ChatProvider, header};
use serde_json::{Value, json};

const THEME_COLOR: &str = "0076D7";

/// Renders entries as MessageCard sections with one fact per changed field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamsProvider;

impl ChatProvider for TeamsProvider {
    fn name(&self) -> &'static str {
        "microsoft_teams"
    }

    fn payload(&self, flagset: &str, entries: &[ChatEntry]) -> Value {
        let sections: Vec<Value> = entries
            .iter()
            .map(|entry| {
                let facts: Vec<Value> = entry
                    .fields
                    .iter()
                    .map(|field| json!({ "name": field.path, "value": field.summary() }))
                    .collect();

                json!({
                    "activityTitle": entry.title(),
                    "facts": facts,
                })
            })
            .collect();

        json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "summary": header(flagset),
            "themeColor": THEME_COLOR,
            "sections": sections,
        })
    }
}
