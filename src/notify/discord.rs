// src/notify/discord.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;

use super::{Notifier, NotifyError};
use crate::item::Item;
use crate::tracker::ChannelId;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Embed accent (Discord "blue").
const EMBED_COLOR: u32 = 0x3498db;
/// Discord rejects embed author names longer than this.
const AUTHOR_NAME_MAX: usize = 256;

/// Posts one embed per listing through the Discord REST API as a bot user.
#[derive(Clone)]
pub struct DiscordNotifier {
    api_base: String,
    token: String,
    client: Client,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(token: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Authorization", format!("Bot {}", self.token))
            .timeout(self.timeout)
    }

    async fn check(rsp: reqwest::Response) -> Result<(), NotifyError> {
        let status = rsp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = rsp.text().await.unwrap_or_default();
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn ready(&self) -> Result<(), NotifyError> {
        let url = format!("{}/users/@me", self.api_base);
        let rsp = self.authed(self.client.get(url)).send().await?;
        Self::check(rsp).await
    }

    async fn resolve(&self, destination: ChannelId) -> bool {
        let url = format!("{}/channels/{}", self.api_base, destination);
        match self.authed(self.client.get(url)).send().await {
            Ok(rsp) => rsp.status().is_success(),
            Err(e) => {
                tracing::warn!(target: "notify", channel = %destination, error = %e, "channel lookup failed");
                false
            }
        }
    }

    async fn notify(&self, destination: ChannelId, item: &Item) -> Result<(), NotifyError> {
        let url = format!("{}/channels/{}/messages", self.api_base, destination);
        let payload = MessagePayload::for_item(item);
        let rsp = self
            .authed(self.client.post(url))
            .json(&payload)
            .send()
            .await?;
        if rsp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(NotifyError::Unresolved(destination));
        }
        Self::check(rsp).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Debug, Serialize)]
struct EmbedAuthor {
    name: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

#[derive(Debug, Serialize)]
struct Embed {
    color: u32,
    author: EmbedAuthor,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
    footer: EmbedFooter,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    embeds: Vec<Embed>,
}

impl MessagePayload {
    fn for_item(item: &Item) -> Self {
        let name: String = item.description.chars().take(AUTHOR_NAME_MAX).collect();
        let footer = match &item.condition {
            Some(c) => format!("{} · {}", item.price, c),
            None => item.price.clone(),
        };
        let image = (!item.thumbnail_url.is_empty()).then(|| EmbedImage {
            url: item.thumbnail_url.clone(),
        });
        Self {
            embeds: vec![Embed {
                color: EMBED_COLOR,
                author: EmbedAuthor {
                    name,
                    url: item.url.clone(),
                },
                image,
                footer: EmbedFooter { text: footer },
                timestamp: Utc::now().to_rfc3339(),
            }],
        }
    }
}
