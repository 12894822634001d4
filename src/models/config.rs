//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ChannelKind, IdentityStrategy};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client settings for webhook channels
    #[serde(default)]
    pub http: HttpConfig,

    /// Listing identity rules
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Message formatting
    #[serde(default)]
    pub compose: ComposeConfig,

    /// Dispatcher behavior
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Snapshot health thresholds
    #[serde(default)]
    pub guard: GuardConfig,

    /// Delivery channels
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Where exported scrape results are read from
    #[serde(default)]
    pub source: SourceConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.compose.terse_limit == 0 {
            return Err(AppError::validation("compose.terse_limit must be > 0"));
        }
        if self.compose.max_name_graphemes == 0 {
            return Err(AppError::validation(
                "compose.max_name_graphemes must be > 0",
            ));
        }
        if self.dispatch.max_concurrent == 0 {
            return Err(AppError::validation("dispatch.max_concurrent must be > 0"));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(AppError::validation("dispatch.max_attempts must be > 0"));
        }
        if self.guard.max_drop_percent > 100 {
            return Err(AppError::validation(
                "guard.max_drop_percent must be between 0 and 100",
            ));
        }
        for kind in ChannelKind::ALL {
            let channel = self.channels.get(kind);
            if channel.enabled && channel.mode == ChannelMode::Webhook {
                let webhook = channel.webhook_url.as_deref().ok_or_else(|| {
                    AppError::validation(format!("channels.{kind}.webhook_url is required"))
                })?;
                url::Url::parse(webhook)?;
            }
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    #[serde(default)]
    pub strategy: IdentityStrategy,
}

/// Message formatting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Maximum listings named in a terse (SMS) message
    #[serde(default = "defaults::terse_limit")]
    pub terse_limit: usize,

    /// Names longer than this are cut in terse messages
    #[serde(default = "defaults::max_name_graphemes")]
    pub max_name_graphemes: usize,

    /// Prefix of subjects and terse headlines
    #[serde(default = "defaults::marker")]
    pub marker: String,

    /// Last line of terse messages
    #[serde(default = "defaults::dashboard_hint")]
    pub dashboard_hint: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            terse_limit: defaults::terse_limit(),
            max_name_graphemes: defaults::max_name_graphemes(),
            marker: defaults::marker(),
            dashboard_hint: defaults::dashboard_hint(),
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Subscriptions processed at once
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Total attempts per (subscription, snapshot) before giving up
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Walk past empty snapshots that carry scrape errors when picking a baseline
    #[serde(default = "defaults::enabled")]
    pub skip_degraded_baselines: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            max_attempts: defaults::max_attempts(),
            skip_degraded_baselines: true,
        }
    }
}

/// Snapshot health thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Maximum tolerated record-count drop (0-100)
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Below this many previous records the drop check is skipped
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
        }
    }
}

/// How a channel delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// Log the message instead of sending it
    #[default]
    Log,
    /// POST the message to a relay endpoint
    Webhook,
}

/// A configured section is enabled unless it says otherwise; an absent one is off.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub mode: ChannelMode,

    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Sender address or number passed to the relay
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "defaults::email_channel")]
    pub email: ChannelConfig,

    #[serde(default)]
    pub sms: ChannelConfig,
}

impl ChannelsConfig {
    pub fn get(&self, kind: ChannelKind) -> &ChannelConfig {
        match kind {
            ChannelKind::Email => &self.email,
            ChannelKind::Sms => &self.sms,
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            email: defaults::email_channel(),
            sms: ChannelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding `{slug}.json` scrape exports, relative to the storage dir
    #[serde(default = "defaults::source_dir")]
    pub dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: defaults::source_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::{ChannelConfig, ChannelMode};

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; kittyalert/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Compose defaults
    pub fn terse_limit() -> usize {
        5
    }
    pub fn max_name_graphemes() -> usize {
        40
    }
    pub fn marker() -> String {
        "🐱".into()
    }
    pub fn dashboard_hint() -> String {
        "Visit your dashboard to see all new kitties!".into()
    }

    // Dispatch defaults
    pub fn max_concurrent() -> usize {
        1
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn enabled() -> bool {
        true
    }

    // Guard defaults
    pub fn max_drop_percent() -> u8 {
        20
    }
    pub fn min_baseline() -> usize {
        10
    }

    pub fn email_channel() -> ChannelConfig {
        ChannelConfig {
            enabled: true,
            mode: ChannelMode::Log,
            webhook_url: None,
            from: None,
        }
    }

    pub fn source_dir() -> PathBuf {
        PathBuf::from("scrapes")
    }
}
