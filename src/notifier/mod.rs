//! Change-set notifiers and the per-tenant fan-out.
//!
//! Every backend implements [`Notifier`]; a [`NotifierFanout`] holds the set
//! configured for one tenant and invokes all of them on each change set,
//! isolating failures per notifier.

pub mod broadcast;
pub mod chat;
pub mod fanout;
pub mod http;
pub mod webhook;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use broadcast::BroadcastNotifier;
pub use chat::{ChatNotifier, DiscordProvider, SlackProvider, TeamsProvider};
pub use fanout::{FanoutReport, NotifierFailure, NotifierFanout};
pub use http::{HttpPoster, HttpPosterBuilder, SIGNATURE_HEADER, sign_body};
pub use webhook::WebhookNotifier;

#[cfg(feature = "metrics")]
pub use metrics::MetricsNotifier;

use crate::changes::ChangeSet;
use crate::error::{DeliveryError, Result};
use crate::settings::{NotifierKind, NotifierSettings};
use async_trait::async_trait;
use std::sync::Arc;

/// A sink that receives change sets and performs a side effect.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs and fan-out reports.
    fn name(&self) -> &str;

    /// Deliver one change set.
    ///
    /// # Errors
    ///
    /// Returns a `DeliveryError` when the backend could not be reached or
    /// rejected the delivery.
    async fn notify(&self, changes: &ChangeSet) -> std::result::Result<(), DeliveryError>;
}

/// Build the HTTP-backed notifier described by `settings` for `flagset`.
///
/// # Errors
///
/// Returns a configuration error if the URL or headers are invalid.
pub fn from_settings(settings: &NotifierSettings, flagset: &str) -> Result<Arc<dyn Notifier>> {
    let mut poster = HttpPoster::builder()
        .with_url(&settings.url)
        .with_timeout(settings.timeout());
    if let Some(secret) = &settings.secret {
        poster = poster.with_secret(secret);
    }
    for (name, value) in &settings.headers {
        poster = poster.with_header(name, value);
    }
    let poster = poster.build()?;

    let notifier: Arc<dyn Notifier> = match settings.kind {
        NotifierKind::Slack => Arc::new(ChatNotifier::new(SlackProvider::default(), poster, flagset)),
        NotifierKind::Discord => Arc::new(ChatNotifier::new(DiscordProvider, poster, flagset)),
        NotifierKind::MicrosoftTeams => Arc::new(ChatNotifier::new(TeamsProvider, poster, flagset)),
        NotifierKind::Webhook => Arc::new(WebhookNotifier::new(poster, flagset).with_meta(settings.meta.clone())),
    };
    Ok(notifier)
}
