// src/models/mod.rs

//! Domain models for the alert pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod listing;
mod notification;
mod shelter;
mod snapshot;
mod subscription;

// Re-export all public types
pub use config::{
    ChannelConfig, ChannelMode, ChannelsConfig, ComposeConfig, Config, DispatchConfig, GuardConfig,
    HttpConfig, IdentityConfig, SourceConfig,
};
pub use listing::{IdentityStrategy, ListingKey, ListingRecord};
pub use notification::{Claim, DispatchState, ErrorEntry, NotificationRecord, RecordId};
pub use shelter::Shelter;
pub use snapshot::{Snapshot, SnapshotId, SnapshotMeta, SnapshotStatus};
pub use subscription::{ChannelKind, Subscriber, Subscription, SubscriptionId};
