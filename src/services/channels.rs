//! Delivery channels.
//!
//! A channel is the capability `send(address, content) -> bool`. Returning
//! `Ok(false)` means the provider refused the message; `Err` means the
//! transport itself failed. The dispatcher treats both as a failed delivery.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{ChannelConfig, ChannelKind, ChannelMode, Config};
use crate::pipeline::compose::Content;
use crate::utils::http::create_async_client;

#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, address: &str, content: &Content) -> Result<bool>;
}

/// Dry-run channel that writes the message to the log.
#[derive(Debug, Clone)]
pub struct LogChannel {
    kind: ChannelKind,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, address: &str, content: &Content) -> Result<bool> {
        match content.subject() {
            Some(subject) => log::info!("[{}] to {}: {}", self.kind, address, subject),
            None => log::info!("[{}] to {}", self.kind, address),
        }
        for line in content.body().lines() {
            log::debug!("  {}", line);
        }
        Ok(true)
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    body: &'a str,
}

/// Hands messages to an HTTP relay that owns the provider integration.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    kind: ChannelKind,
    client: Client,
    url: url::Url,
    from: Option<String>,
}

impl WebhookChannel {
    pub fn new(kind: ChannelKind, client: Client, url: &str, from: Option<String>) -> Result<Self> {
        Ok(Self {
            kind,
            client,
            url: url::Url::parse(url)?,
            from,
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, address: &str, content: &Content) -> Result<bool> {
        let payload = WebhookPayload {
            to: address,
            from: self.from.as_deref(),
            subject: content.subject(),
            body: content.body(),
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::delivery(self.kind, e))?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("[{}] relay answered {} for {}", self.kind, status, address);
        }
        Ok(status.is_success())
    }
}

/// The enabled channels, by kind.
#[derive(Clone, Default)]
pub struct ChannelSet {
    channels: HashMap<ChannelKind, Arc<dyn Channel>>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the channels enabled in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut set = Self::new();
        let mut client: Option<Client> = None;

        for kind in ChannelKind::ALL {
            let channel_config: &ChannelConfig = config.channels.get(kind);
            if !channel_config.enabled {
                continue;
            }
            let channel: Arc<dyn Channel> = match channel_config.mode {
                ChannelMode::Log => Arc::new(LogChannel::new(kind)),
                ChannelMode::Webhook => {
                    let url = channel_config.webhook_url.as_deref().ok_or_else(|| {
                        AppError::config(format!("channels.{kind}.webhook_url is required"))
                    })?;
                    let client = match &client {
                        Some(client) => client.clone(),
                        None => {
                            let created = create_async_client(&config.http)?;
                            client = Some(created.clone());
                            created
                        }
                    };
                    Arc::new(WebhookChannel::new(
                        kind,
                        client,
                        url,
                        channel_config.from.clone(),
                    )?)
                }
            };
            set.channels.insert(kind, channel);
        }

        Ok(set)
    }

    /// Add or replace the channel for its kind.
    pub fn with(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    pub fn get(&self, kind: ChannelKind) -> Option<&Arc<dyn Channel>> {
        self.channels.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        let mut kinds: Vec<_> = self.channels.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSet")
            .field("kinds", &self.kinds())
            .finish()
    }
}
