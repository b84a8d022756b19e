// src/notify/mod.rs
pub mod discord;

use async_trait::async_trait;

use crate::item::Item;
use crate::tracker::ChannelId;

pub use discord::DiscordNotifier;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat API answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("channel {0} could not be resolved")]
    Unresolved(ChannelId),
}

/// Delivers new-item announcements to chat channels.
///
/// Delivery is best-effort: callers log failures and move on, never retrying
/// within the same sweep.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Resolves once the chat connection is usable. Gates the poll loop.
    async fn ready(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    /// Whether `destination` currently exists and is reachable.
    async fn resolve(&self, destination: ChannelId) -> bool;

    async fn notify(&self, destination: ChannelId, item: &Item) -> Result<(), NotifyError>;

    fn name(&self) -> &'static str;
}

/// Stand-in used when no chat credentials are configured: every channel
/// resolves and announcements only go to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn resolve(&self, _destination: ChannelId) -> bool {
        true
    }

    async fn notify(&self, destination: ChannelId, item: &Item) -> Result<(), NotifyError> {
        tracing::info!(
            target: "notify",
            channel = %destination,
            id = %item.id,
            price = %item.price,
            url = %item.url,
            "new listing: {}",
            item.description
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
