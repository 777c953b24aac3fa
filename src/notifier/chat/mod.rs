//! Chat-ops notifiers: Slack, Discord and Microsoft Teams.
//!
//! A change set is first rendered into provider-neutral [`ChatEntry`] values,
//! then each [`ChatProvider`] turns the entries into its own JSON payload.

mod discord;
mod slack;
mod teams;

pub use discord::DiscordProvider;
pub use slack::SlackProvider;
pub use teams::TeamsProvider;

use super::{HttpPoster, Notifier};
use crate::changes::{ChangeSet, FieldChange, field_diff};
use crate::error::{DeliveryError, RenderError};
use async_trait::async_trait;
use std::fmt;
use tracing::{debug, warn};

/// What happened to a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    /// The flag was removed
    Deleted,
    /// The flag is new
    Created,
    /// The flag definition changed
    Updated,
}

impl ChatAction {
    /// RGB color used by providers that support colored entries.
    pub fn color(self) -> u32 {
        match self {
            Self::Deleted => 0xFF0000,
            Self::Created => 0x008000,
            Self::Updated => 0xFFA500,
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Self::Deleted => "❌",
            Self::Created => "🆕",
            Self::Updated => "✏️",
        }
    }
}

impl fmt::Display for ChatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => write!(f, "deleted"),
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// One rendered flag change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    /// Flag name
    pub flag: String,
    /// What happened to it
    pub action: ChatAction,
    /// Changed fields, sorted by path; only populated for updates
    pub fields: Vec<FieldChange>,
}

impl ChatEntry {
    /// Plain headline such as `checkout updated`.
    pub fn headline(&self) -> String {
        format!("{} {}", self.flag, self.action)
    }

    /// Decorated title used in chat payloads.
    pub fn title(&self) -> String {
        format!("{} Flag \"{}\" {}", self.action.icon(), self.flag, self.action)
    }
}

/// Entries that rendered, and the flags that could not be.
#[derive(Debug, Default)]
pub struct RenderedChanges {
    /// Deleted entries first, then created, then updated; by name within each
    pub entries: Vec<ChatEntry>,
    /// Per-flag failures; these flags are absent from `entries`
    pub failures: Vec<RenderError>,
}

/// Render a change set into chat entries.
///
/// An updated flag always yields an entry, even when its definitions are
/// structurally equal (the field list is then empty). A flag that fails to
/// render is recorded in `failures` and does not stop the others.
///
/// # Examples
///
/// ```rust
/// use flag_relay::changes::ChangeSet;
/// use flag_relay::notifier::chat::render_changes;
/// use serde_json::json;
///
/// let mut changes = ChangeSet::new();
/// changes.add("f2", json!({"disable": false}));
/// changes.delete("f1", json!({"disable": false}));
/// changes.update("f3", json!({"disable": false}), json!({"disable": true}));
///
/// let rendered = render_changes(&changes);
/// let headlines: Vec<String> = rendered.entries.iter().map(|e| e.headline()).collect();
/// assert_eq!(headlines, ["f1 deleted", "f2 created", "f3 updated"]);
/// ```
pub fn render_changes(changes: &ChangeSet) -> RenderedChanges {
    let mut rendered = RenderedChanges::default();

    for flag in changes.deleted().keys() {
        rendered.entries.push(ChatEntry {
            flag: flag.clone(),
            action: ChatAction::Deleted,
            fields: Vec::new(),
        });
    }

    for flag in changes.added().keys() {
        rendered.entries.push(ChatEntry {
            flag: flag.clone(),
            action: ChatAction::Created,
            fields: Vec::new(),
        });
    }

    for (flag, change) in changes.updated() {
        match field_diff(flag, &change.before, &change.after) {
            Ok(fields) => rendered.entries.push(ChatEntry {
                flag: flag.clone(),
                action: ChatAction::Updated,
                fields,
            }),
            Err(e) => rendered.failures.push(e),
        }
    }

    rendered
}

/// Turns rendered entries into one provider-specific JSON payload.
pub trait ChatProvider: Send + Sync {
    /// Provider name, used as the notifier name.
    fn name(&self) -> &'static str;

    /// Build the request body for one change set of `flagset`.
    fn payload(&self, flagset: &str, entries: &[ChatEntry]) -> serde_json::Value;
}

/// A chat notifier for one provider.
pub struct ChatNotifier<P> {
    provider: P,
    poster: HttpPoster,
    flagset: String,
}

impl<P: ChatProvider> ChatNotifier<P> {
    /// Create a notifier posting `provider` payloads through `poster`.
    pub fn new(provider: P, poster: HttpPoster, flagset: impl Into<String>) -> Self {
        Self {
            provider,
            poster,
            flagset: flagset.into(),
        }
    }

    /// Render `changes` and build the request body, logging render failures.
    pub fn build_payload(&self, changes: &ChangeSet) -> serde_json::Value {
        let rendered = render_changes(changes);
        for failure in &rendered.failures {
            warn!(
                notifier = self.provider.name(),
                flagset = %self.flagset,
                error = %failure,
                "Skipping flag that failed to render"
            );
        }
        self.provider.payload(&self.flagset, &rendered.entries)
    }
}

#[async_trait]
impl<P: ChatProvider> Notifier for ChatNotifier<P> {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn notify(&self, changes: &ChangeSet) -> Result<(), DeliveryError> {
        let payload = self.build_payload(changes);
        debug!(notifier = self.provider.name(), url = self.poster.url(), "Posting chat message");
        self.poster.post_json(&payload).await
    }
}

/// Headline shared by every provider.
fn header(flagset: &str) -> String {
    format!("Changes detected in flagset \"{}\"", flagset)
}
