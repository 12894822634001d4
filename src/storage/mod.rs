//! Storage abstractions for snapshots, the subscriber directory, and the
//! notification ledger.
//!
//! Backends:
//! - `MemoryStore`: in-process, for tests and one-shot runs
//! - `LocalStorage`: JSON files under a root directory
//!
//! ## Directory Structure (`LocalStorage`)
//!
//! ```text
//! storage/
//! ├── config.toml            # Configuration
//! ├── directory.json         # Shelters, subscribers, subscriptions
//! ├── ledger.json            # Notification records
//! └── snapshots/
//!     ├── index.json         # Snapshot metadata in creation order
//!     └── happy-tails/
//!         ├── 00000001.json
//!         └── 00000002.json
//! ```

pub mod local;
pub mod memory;
mod state;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ChannelKind, Claim, ListingRecord, NotificationRecord, Shelter, Snapshot, SnapshotId,
    SnapshotMeta, Subscriber, Subscription, SubscriptionId,
};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStore;

/// A backend that implements every repository.
pub trait Backend: SnapshotStore + Directory + NotificationLedger {}

impl<T: SnapshotStore + Directory + NotificationLedger> Backend for T {}

/// Append-only log of scrape snapshots.
///
/// Snapshot ids and creation timestamps both increase in creation order.
/// Only completed snapshots are returned by `latest` and `previous`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Start a snapshot for a shelter in the `running` state.
    async fn begin(&self, shelter: &str) -> Result<Snapshot>;

    /// Attach results and mark the snapshot completed. Completed snapshots
    /// are immutable.
    async fn complete(
        &self,
        id: SnapshotId,
        records: Vec<ListingRecord>,
        errors: Vec<String>,
    ) -> Result<Snapshot>;

    /// Create and persist a completed snapshot in one step.
    async fn record_snapshot(
        &self,
        shelter: &str,
        records: Vec<ListingRecord>,
        errors: Vec<String>,
    ) -> Result<Snapshot> {
        let snapshot = self.begin(shelter).await?;
        self.complete(snapshot.id, records, errors).await
    }

    async fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>>;

    /// Most recent completed snapshot for a shelter.
    async fn latest(&self, shelter: &str) -> Result<Option<Snapshot>>;

    /// Completed snapshot immediately preceding `before` for the same shelter.
    async fn previous(&self, shelter: &str, before: &Snapshot) -> Result<Option<Snapshot>>;

    /// Metadata of every snapshot for a shelter, oldest first.
    async fn history(&self, shelter: &str) -> Result<Vec<SnapshotMeta>>;
}

/// Shelters, subscribers, and their subscriptions.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn shelters(&self) -> Result<Vec<Shelter>>;

    async fn shelter(&self, slug: &str) -> Result<Option<Shelter>>;

    /// Register a shelter. Fails if the slug is taken.
    async fn add_shelter(&self, shelter: Shelter) -> Result<Shelter>;

    async fn subscriber(&self, id: &str) -> Result<Option<Subscriber>>;

    /// Insert or replace a subscriber by id.
    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<()>;

    async fn subscriptions_for(&self, shelter: &str) -> Result<Vec<Subscription>>;

    /// Subscribe to a shelter. Subscribing again replaces the channel list.
    async fn subscribe(
        &self,
        subscriber_id: &str,
        shelter: &str,
        channels: Vec<ChannelKind>,
    ) -> Result<Subscription>;

    /// Returns whether a subscription was removed.
    async fn unsubscribe(&self, subscriber_id: &str, shelter: &str) -> Result<bool>;
}

/// Durable per-(subscription, snapshot) notification records.
///
/// At most one record exists per pair. `claim` is atomic with respect to
/// other writers of the same backend.
#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Create the record for a pair, re-open it if it failed and attempts
    /// remain, or hand back the existing one untouched.
    async fn claim(
        &self,
        subscription: SubscriptionId,
        snapshot: SnapshotId,
        max_attempts: u32,
    ) -> Result<Claim>;

    /// Persist changes to a claimed record.
    async fn save(&self, record: &NotificationRecord) -> Result<()>;

    /// The subscription's most recent record, in any state, for a snapshot
    /// older than `before`.
    async fn latest_record(
        &self,
        subscription: SubscriptionId,
        before: SnapshotId,
    ) -> Result<Option<NotificationRecord>>;

    async fn records_for_snapshot(&self, snapshot: SnapshotId) -> Result<Vec<NotificationRecord>>;
}
