//! In-memory storage backend.
//!
//! Holds every repository behind one mutex. Used by tests and for dry runs
//! where nothing needs to survive the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{
    ChannelKind, Claim, ListingRecord, NotificationRecord, Shelter, Snapshot, SnapshotId,
    SnapshotMeta, SnapshotStatus, Subscriber, Subscription, SubscriptionId,
};
use crate::storage::state::{DirectoryState, LedgerState, SnapshotIndex};
use crate::storage::{Directory, NotificationLedger, SnapshotStore};

#[derive(Debug, Default)]
struct Inner {
    index: SnapshotIndex,
    snapshots: HashMap<SnapshotId, Snapshot>,
    directory: DirectoryState,
    ledger: LedgerState,
}

/// In-process storage backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a storage error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every notification record, for inspection.
    pub fn ledger_records(&self) -> Result<Vec<NotificationRecord>> {
        Ok(self.lock()?.ledger.records.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::storage("memory store is unavailable"));
        }
        self.inner
            .lock()
            .map_err(|_| AppError::storage("memory store lock poisoned"))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn begin(&self, shelter: &str) -> Result<Snapshot> {
        let mut inner = self.lock()?;
        let snapshot = inner.index.begin(shelter);
        inner.snapshots.insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    async fn complete(
        &self,
        id: SnapshotId,
        records: Vec<ListingRecord>,
        errors: Vec<String>,
    ) -> Result<Snapshot> {
        let mut inner = self.lock()?;
        let mut snapshot = inner
            .snapshots
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::storage(format!("Unknown snapshot {id}")))?;
        snapshot.records = records;
        snapshot.errors = errors;
        snapshot.status = SnapshotStatus::Completed;

        inner.index.complete(&snapshot)?;
        inner.snapshots.insert(id, snapshot.clone());
        Ok(snapshot)
    }

    async fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        Ok(self.lock()?.snapshots.get(&id).cloned())
    }

    async fn latest(&self, shelter: &str) -> Result<Option<Snapshot>> {
        let inner = self.lock()?;
        Ok(inner
            .index
            .latest(shelter)
            .and_then(|meta| inner.snapshots.get(&meta.id).cloned()))
    }

    async fn previous(&self, shelter: &str, before: &Snapshot) -> Result<Option<Snapshot>> {
        let inner = self.lock()?;
        Ok(inner
            .index
            .previous(shelter, before.id)
            .and_then(|meta| inner.snapshots.get(&meta.id).cloned()))
    }

    async fn history(&self, shelter: &str) -> Result<Vec<SnapshotMeta>> {
        Ok(self.lock()?.index.history(shelter))
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn shelters(&self) -> Result<Vec<Shelter>> {
        Ok(self.lock()?.directory.shelters.clone())
    }

    async fn shelter(&self, slug: &str) -> Result<Option<Shelter>> {
        Ok(self.lock()?.directory.shelter(slug).cloned())
    }

    async fn add_shelter(&self, shelter: Shelter) -> Result<Shelter> {
        self.lock()?.directory.add_shelter(shelter)
    }

    async fn subscriber(&self, id: &str) -> Result<Option<Subscriber>> {
        Ok(self.lock()?.directory.subscriber(id).cloned())
    }

    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<()> {
        self.lock()?.directory.upsert_subscriber(subscriber);
        Ok(())
    }

    async fn subscriptions_for(&self, shelter: &str) -> Result<Vec<Subscription>> {
        Ok(self.lock()?.directory.subscriptions_for(shelter))
    }

    async fn subscribe(
        &self,
        subscriber_id: &str,
        shelter: &str,
        channels: Vec<ChannelKind>,
    ) -> Result<Subscription> {
        self.lock()?
            .directory
            .subscribe(subscriber_id, shelter, channels)
    }

    async fn unsubscribe(&self, subscriber_id: &str, shelter: &str) -> Result<bool> {
        Ok(self.lock()?.directory.unsubscribe(subscriber_id, shelter))
    }
}

#[async_trait]
impl NotificationLedger for MemoryStore {
    async fn claim(
        &self,
        subscription: SubscriptionId,
        snapshot: SnapshotId,
        max_attempts: u32,
    ) -> Result<Claim> {
        Ok(self
            .lock()?
            .ledger
            .claim(subscription, snapshot, max_attempts))
    }

    async fn save(&self, record: &NotificationRecord) -> Result<()> {
        self.lock()?.ledger.save(record)
    }

    async fn latest_record(
        &self,
        subscription: SubscriptionId,
        before: SnapshotId,
    ) -> Result<Option<NotificationRecord>> {
        Ok(self.lock()?.ledger.latest_record(subscription, before))
    }

    async fn records_for_snapshot(&self, snapshot: SnapshotId) -> Result<Vec<NotificationRecord>> {
        Ok(self.lock()?.ledger.for_snapshot(snapshot))
    }
}
