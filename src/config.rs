// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::scheduler::{NotifyOrder, PollSettings, DEFAULT_WINDOW};

pub const ENV_CONFIG_PATH: &str = "BOT_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/bot.toml";
pub const ENV_DISCORD_TOKEN: &str = "DISCORD_BOT_TOKEN";

fn default_trackers_file() -> PathBuf {
    PathBuf::from("trackers.csv")
}
fn default_interval_secs() -> u64 {
    30
}
fn default_fetch_timeout_secs() -> u64 {
    45
}
fn default_window() -> usize {
    DEFAULT_WINDOW
}
fn default_base_url() -> String {
    "https://www.vinted.es/".to_string()
}
fn default_source_endpoint() -> String {
    "http://127.0.0.1:3001/render".to_string()
}
fn default_api_base() -> String {
    crate::notify::discord::DEFAULT_API_BASE.to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_trackers_file")]
    pub trackers_file: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            trackers_file: default_trackers_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// How many of the newest listings are compared each sweep.
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub notify_order: NotifyOrder,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            window: default_window(),
            notify_order: NotifyOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for MarketplaceSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    /// Render service answering `GET ?url=<query>` with listing tiles.
    #[serde(default = "default_source_endpoint")]
    pub endpoint: String,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            endpoint: default_source_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Process configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub marketplace: MarketplaceSection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub discord: DiscordSection,
    #[serde(default)]
    pub api: ApiSection,
}

impl BotConfig {
    pub fn parse(s: &str) -> Result<Self> {
        let cfg: BotConfig = toml::from_str(s).context("parsing bot config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading bot config from {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load using env var + fallbacks:
    /// 1) $BOT_CONFIG_PATH
    /// 2) config/bot.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            bail!("poll.interval_secs must be positive");
        }
        if self.poll.fetch_timeout_secs == 0 {
            bail!("poll.fetch_timeout_secs must be positive");
        }
        if self.poll.window == 0 {
            bail!("poll.window must be at least 1");
        }
        self.marketplace_url()?;
        self.source_endpoint()?;
        self.listen_addr()?;
        Ok(())
    }

    pub fn marketplace_url(&self) -> Result<Url> {
        let url = Url::parse(&self.marketplace.base_url)
            .with_context(|| format!("marketplace.base_url {:?}", self.marketplace.base_url))?;
        if url.host_str().is_none() {
            bail!("marketplace.base_url has no host");
        }
        Ok(url)
    }

    pub fn source_endpoint(&self) -> Result<Url> {
        Url::parse(&self.source.endpoint)
            .with_context(|| format!("source.endpoint {:?}", self.source.endpoint))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.api
            .listen_addr
            .parse()
            .with_context(|| format!("api.listen_addr {:?}", self.api.listen_addr))
    }

    pub fn poll_settings(&self) -> Result<PollSettings> {
        let mut settings = PollSettings::new(self.marketplace_url()?);
        settings.interval = Duration::from_secs(self.poll.interval_secs);
        settings.fetch_timeout = Duration::from_secs(self.poll.fetch_timeout_secs);
        settings.window = self.poll.window;
        settings.notify_order = self.poll.notify_order;
        Ok(settings)
    }

    /// Bot token from the environment; `None` when unset or blank.
    pub fn discord_token() -> Option<String> {
        std::env::var(ENV_DISCORD_TOKEN)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}
