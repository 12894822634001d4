//! Local filesystem storage implementation.
//!
//! Every file is written atomically (write to temp, then rename). A process
//! wide lock serializes read-modify-write cycles, which is what enforces the
//! one-record-per-(subscription, snapshot) rule for writers sharing this
//! instance.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── directory.json
//! ├── ledger.json
//! └── snapshots/
//!     ├── index.json
//!     └── {slug}/{id:08}.json
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    ChannelKind, Claim, ListingRecord, NotificationRecord, Shelter, Snapshot, SnapshotId,
    SnapshotMeta, SnapshotStatus, Subscriber, Subscription, SubscriptionId,
};
use crate::storage::state::{DirectoryState, LedgerState, SnapshotIndex};
use crate::storage::{Directory, NotificationLedger, SnapshotStore};

const DIRECTORY_KEY: &str = "directory.json";
const LEDGER_KEY: &str = "ledger.json";
const INDEX_KEY: &str = "snapshots/index.json";

/// Local filesystem storage backend.
pub struct LocalStorage {
    root_dir: PathBuf,
    lock: Mutex<()>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Snapshot file key. Shelter slugs become path segments, so they are checked.
    fn snapshot_key(shelter: &str, id: SnapshotId) -> Result<String> {
        let safe = !shelter.is_empty()
            && shelter
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(AppError::storage(format!(
                "Shelter slug '{shelter}' is not a safe path segment"
            )));
        }
        Ok(format!("snapshots/{}/{:08}.json", shelter, id))
    }

    async fn load_index(&self) -> Result<SnapshotIndex> {
        Ok(self.read_json(INDEX_KEY).await?.unwrap_or_default())
    }

    async fn load_directory(&self) -> Result<DirectoryState> {
        Ok(self.read_json(DIRECTORY_KEY).await?.unwrap_or_default())
    }

    async fn load_ledger(&self) -> Result<LedgerState> {
        Ok(self.read_json(LEDGER_KEY).await?.unwrap_or_default())
    }

    async fn load_snapshot(&self, meta: &SnapshotMeta) -> Result<Snapshot> {
        let key = Self::snapshot_key(&meta.shelter, meta.id)?;
        self.read_json(&key)
            .await?
            .ok_or_else(|| AppError::storage(format!("Snapshot file {key} is missing")))
    }
}

#[async_trait]
impl SnapshotStore for LocalStorage {
    async fn begin(&self, shelter: &str) -> Result<Snapshot> {
        let _guard = self.lock.lock().await;
        let mut index = self.load_index().await?;
        let snapshot = index.begin(shelter);

        self.write_json(&Self::snapshot_key(shelter, snapshot.id)?, &snapshot)
            .await?;
        self.write_json(INDEX_KEY, &index).await?;
        Ok(snapshot)
    }

    async fn complete(
        &self,
        id: SnapshotId,
        records: Vec<ListingRecord>,
        errors: Vec<String>,
    ) -> Result<Snapshot> {
        let _guard = self.lock.lock().await;
        let mut index = self.load_index().await?;
        let meta = index
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::storage(format!("Unknown snapshot {id}")))?;

        let mut snapshot = self.load_snapshot(&meta).await?;
        snapshot.records = records;
        snapshot.errors = errors;
        snapshot.status = SnapshotStatus::Completed;
        index.complete(&snapshot)?;

        self.write_json(&Self::snapshot_key(&snapshot.shelter, id)?, &snapshot)
            .await?;
        self.write_json(INDEX_KEY, &index).await?;
        log::debug!(
            "Snapshot {} stored with {} listings",
            id,
            snapshot.records.len()
        );
        Ok(snapshot)
    }

    async fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        let index = self.load_index().await?;
        match index.get(id) {
            Some(meta) => Ok(Some(self.load_snapshot(meta).await?)),
            None => Ok(None),
        }
    }

    async fn latest(&self, shelter: &str) -> Result<Option<Snapshot>> {
        let index = self.load_index().await?;
        match index.latest(shelter) {
            Some(meta) => Ok(Some(self.load_snapshot(meta).await?)),
            None => Ok(None),
        }
    }

    async fn previous(&self, shelter: &str, before: &Snapshot) -> Result<Option<Snapshot>> {
        let index = self.load_index().await?;
        match index.previous(shelter, before.id) {
            Some(meta) => Ok(Some(self.load_snapshot(meta).await?)),
            None => Ok(None),
        }
    }

    async fn history(&self, shelter: &str) -> Result<Vec<SnapshotMeta>> {
        Ok(self.load_index().await?.history(shelter))
    }
}

#[async_trait]
impl Directory for LocalStorage {
    async fn shelters(&self) -> Result<Vec<Shelter>> {
        Ok(self.load_directory().await?.shelters)
    }

    async fn shelter(&self, slug: &str) -> Result<Option<Shelter>> {
        Ok(self.load_directory().await?.shelter(slug).cloned())
    }

    async fn add_shelter(&self, shelter: Shelter) -> Result<Shelter> {
        let _guard = self.lock.lock().await;
        let mut directory = self.load_directory().await?;
        let shelter = directory.add_shelter(shelter)?;
        self.write_json(DIRECTORY_KEY, &directory).await?;
        Ok(shelter)
    }

    async fn subscriber(&self, id: &str) -> Result<Option<Subscriber>> {
        Ok(self.load_directory().await?.subscriber(id).cloned())
    }

    async fn upsert_subscriber(&self, subscriber: Subscriber) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut directory = self.load_directory().await?;
        directory.upsert_subscriber(subscriber);
        self.write_json(DIRECTORY_KEY, &directory).await
    }

    async fn subscriptions_for(&self, shelter: &str) -> Result<Vec<Subscription>> {
        Ok(self.load_directory().await?.subscriptions_for(shelter))
    }

    async fn subscribe(
        &self,
        subscriber_id: &str,
        shelter: &str,
        channels: Vec<ChannelKind>,
    ) -> Result<Subscription> {
        let _guard = self.lock.lock().await;
        let mut directory = self.load_directory().await?;
        let subscription = directory.subscribe(subscriber_id, shelter, channels)?;
        self.write_json(DIRECTORY_KEY, &directory).await?;
        Ok(subscription)
    }

    async fn unsubscribe(&self, subscriber_id: &str, shelter: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut directory = self.load_directory().await?;
        let removed = directory.unsubscribe(subscriber_id, shelter);
        if removed {
            self.write_json(DIRECTORY_KEY, &directory).await?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl NotificationLedger for LocalStorage {
    async fn claim(
        &self,
        subscription: SubscriptionId,
        snapshot: SnapshotId,
        max_attempts: u32,
    ) -> Result<Claim> {
        let _guard = self.lock.lock().await;
        let mut ledger = self.load_ledger().await?;
        let claim = ledger.claim(subscription, snapshot, max_attempts);
        if !matches!(claim, Claim::Existing(_)) {
            self.write_json(LEDGER_KEY, &ledger).await?;
        }
        Ok(claim)
    }

    async fn save(&self, record: &NotificationRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut ledger = self.load_ledger().await?;
        ledger.save(record)?;
        self.write_json(LEDGER_KEY, &ledger).await
    }

    async fn latest_record(
        &self,
        subscription: SubscriptionId,
        before: SnapshotId,
    ) -> Result<Option<NotificationRecord>> {
        Ok(self
            .load_ledger()
            .await?
            .latest_record(subscription, before))
    }

    async fn records_for_snapshot(&self, snapshot: SnapshotId) -> Result<Vec<NotificationRecord>> {
        Ok(self.load_ledger().await?.for_snapshot(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DispatchState;
    use tempfile::TempDir;

    fn listing(description: &str) -> ListingRecord {
        ListingRecord {
            name: Some(description.to_string()),
            description: Some(description.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let data = storage.read_bytes("nope.txt").await.unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_snapshots_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let written = {
            let storage = LocalStorage::new(tmp.path());
            storage
                .record_snapshot("happy-tails", vec![listing("A")], vec![])
                .await
                .unwrap();
            storage
                .record_snapshot("happy-tails", vec![listing("A"), listing("B")], vec!["warn".into()])
                .await
                .unwrap()
        };

        let storage = LocalStorage::new(tmp.path());
        let latest = storage.latest("happy-tails").await.unwrap().unwrap();
        assert_eq!(latest.id, written.id);
        assert_eq!(latest.records.len(), 2);
        assert_eq!(latest.errors, vec!["warn".to_string()]);

        let previous = storage.previous("happy-tails", &latest).await.unwrap().unwrap();
        assert_eq!(previous.records, vec![listing("A")]);
        assert!(tmp.path().join("snapshots/happy-tails/00000001.json").exists());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_slug() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let result = storage.begin("../escape").await;
        assert!(matches!(result, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn test_ledger_claim_persists_uniqueness() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let Claim::Created(mut record) = storage.claim(1, 1, 3).await.unwrap() else {
            panic!("expected a new record");
        };
        record.mark_delivered(ChannelKind::Email);
        record.finish(DispatchState::Sent);
        storage.save(&record).await.unwrap();

        let reopened = LocalStorage::new(tmp.path());
        match reopened.claim(1, 1, 3).await.unwrap() {
            Claim::Existing(existing) => {
                assert_eq!(existing.state, DispatchState::Sent);
                assert!(existing.delivered_on(ChannelKind::Email));
            }
            other => panic!("unexpected claim {:?}", other),
        }
        assert_eq!(reopened.records_for_snapshot(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_directory_round_trip() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage
            .add_shelter(Shelter::new("Happy Tails", Some("https://happytails.org".into())))
            .await
            .unwrap();
        storage
            .upsert_subscriber(Subscriber {
                id: "ada".into(),
                name: "Ada".into(),
                email: Some("ada@example.com".into()),
                phone: None,
            })
            .await
            .unwrap();
        storage
            .subscribe("ada", "happy-tails", vec![ChannelKind::Email])
            .await
            .unwrap();

        let subs = storage.subscriptions_for("happy-tails").await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].subscriber_id, "ada");
        assert!(storage.unsubscribe("ada", "happy-tails").await.unwrap());
        assert!(storage.subscriptions_for("happy-tails").await.unwrap().is_empty());
    }
}
