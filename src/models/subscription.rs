//! Subscribers, subscriptions, and delivery channels.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::utils::{is_valid_email, is_valid_phone};

pub type SubscriptionId = u64;

/// A delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Email, ChannelKind::Sms];

    /// Rich channels get a subject and the full listing.
    pub fn is_rich(&self) -> bool {
        matches!(self, ChannelKind::Email)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(ChannelKind::Email),
            "sms" => Ok(ChannelKind::Sms),
            other => Err(AppError::validation(format!("Unknown channel '{other}'"))),
        }
    }
}

/// A person who wants to hear about new animals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscriber {
    /// Unique handle (e.g., a username)
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// E.164 phone number for SMS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Subscriber {
    /// Delivery address for a channel. Malformed addresses count as missing.
    pub fn address_for(&self, channel: ChannelKind) -> Option<&str> {
        match channel {
            ChannelKind::Email => self
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| is_valid_email(e)),
            ChannelKind::Sms => self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| is_valid_phone(p)),
        }
    }
}

/// "Notify me about new listings at this shelter."
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,

    pub subscriber_id: String,

    /// Shelter slug
    pub shelter: String,

    /// Channels to deliver on
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelKind>,

    pub created_at: DateTime<Utc>,
}

fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Email]
}
