//! Backend-independent state transitions shared by the storage backends.
//!
//! Each backend serializes access to these structures; the methods here
//! assume exclusive access.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{
    ChannelKind, Claim, NotificationRecord, RecordId, Shelter, Snapshot, SnapshotId, SnapshotMeta,
    SnapshotStatus, Subscriber, Subscription, SubscriptionId,
};

/// Snapshot metadata in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotIndex {
    #[serde(default)]
    pub entries: Vec<SnapshotMeta>,
    #[serde(default)]
    pub next_id: SnapshotId,
}

impl SnapshotIndex {
    /// Allocate a running snapshot with a strictly increasing timestamp.
    pub fn begin(&mut self, shelter: &str) -> Snapshot {
        let now = Utc::now();
        let created_at = match self.entries.last() {
            Some(last) if now <= last.created_at => last.created_at + Duration::microseconds(1),
            _ => now,
        };
        self.next_id += 1;

        let snapshot = Snapshot {
            id: self.next_id,
            shelter: shelter.to_string(),
            created_at,
            status: SnapshotStatus::Running,
            records: Vec::new(),
            errors: Vec::new(),
        };
        self.entries.push(SnapshotMeta::from(&snapshot));
        snapshot
    }

    /// Record completion of a running snapshot.
    pub fn complete(&mut self, snapshot: &Snapshot) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == snapshot.id)
            .ok_or_else(|| AppError::storage(format!("Unknown snapshot {}", snapshot.id)))?;
        if entry.status == SnapshotStatus::Completed {
            return Err(AppError::storage(format!(
                "Snapshot {} is already completed",
                snapshot.id
            )));
        }
        *entry = SnapshotMeta::from(snapshot);
        Ok(())
    }

    pub fn get(&self, id: SnapshotId) -> Option<&SnapshotMeta> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn latest(&self, shelter: &str) -> Option<&SnapshotMeta> {
        self.completed(shelter).next_back()
    }

    pub fn previous(&self, shelter: &str, before: SnapshotId) -> Option<&SnapshotMeta> {
        self.completed(shelter).filter(|e| e.id < before).next_back()
    }

    pub fn history(&self, shelter: &str) -> Vec<SnapshotMeta> {
        self.entries
            .iter()
            .filter(|e| e.shelter == shelter)
            .cloned()
            .collect()
    }

    fn completed<'a>(&'a self, shelter: &str) -> impl DoubleEndedIterator<Item = &'a SnapshotMeta> {
        self.entries
            .iter()
            .filter(move |e| e.shelter == shelter && e.status == SnapshotStatus::Completed)
    }
}

/// Shelters, subscribers, and subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryState {
    #[serde(default)]
    pub shelters: Vec<Shelter>,
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub next_subscription_id: SubscriptionId,
}

impl DirectoryState {
    pub fn shelter(&self, slug: &str) -> Option<&Shelter> {
        self.shelters.iter().find(|s| s.slug == slug)
    }

    pub fn add_shelter(&mut self, shelter: Shelter) -> Result<Shelter> {
        if shelter.slug.is_empty() {
            return Err(AppError::validation(format!(
                "Shelter name '{}' yields an empty slug",
                shelter.name
            )));
        }
        if self.shelter(&shelter.slug).is_some() {
            return Err(AppError::validation(format!(
                "Shelter '{}' already exists",
                shelter.slug
            )));
        }
        self.shelters.push(shelter.clone());
        Ok(shelter)
    }

    pub fn subscriber(&self, id: &str) -> Option<&Subscriber> {
        self.subscribers.iter().find(|s| s.id == id)
    }

    pub fn upsert_subscriber(&mut self, subscriber: Subscriber) {
        match self.subscribers.iter_mut().find(|s| s.id == subscriber.id) {
            Some(existing) => *existing = subscriber,
            None => self.subscribers.push(subscriber),
        }
    }

    pub fn subscriptions_for(&self, shelter: &str) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .filter(|s| s.shelter == shelter)
            .cloned()
            .collect()
    }

    pub fn subscribe(
        &mut self,
        subscriber_id: &str,
        shelter: &str,
        mut channels: Vec<ChannelKind>,
    ) -> Result<Subscription> {
        if self.subscriber(subscriber_id).is_none() {
            return Err(AppError::validation(format!(
                "Unknown subscriber '{subscriber_id}'"
            )));
        }
        if self.shelter(shelter).is_none() {
            return Err(AppError::validation(format!("Unknown shelter '{shelter}'")));
        }
        channels.sort();
        channels.dedup();
        if channels.is_empty() {
            channels.push(ChannelKind::Email);
        }

        if let Some(existing) = self
            .subscriptions
            .iter_mut()
            .find(|s| s.subscriber_id == subscriber_id && s.shelter == shelter)
        {
            existing.channels = channels;
            return Ok(existing.clone());
        }

        self.next_subscription_id += 1;
        let subscription = Subscription {
            id: self.next_subscription_id,
            subscriber_id: subscriber_id.to_string(),
            shelter: shelter.to_string(),
            channels,
            created_at: Utc::now(),
        };
        self.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    pub fn unsubscribe(&mut self, subscriber_id: &str, shelter: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|s| !(s.subscriber_id == subscriber_id && s.shelter == shelter));
        self.subscriptions.len() != before
    }
}

/// Notification records with the (subscription, snapshot) uniqueness rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default)]
    pub records: Vec<NotificationRecord>,
    #[serde(default)]
    pub next_id: RecordId,
}

impl LedgerState {
    pub fn claim(
        &mut self,
        subscription: SubscriptionId,
        snapshot: SnapshotId,
        max_attempts: u32,
    ) -> Claim {
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.subscription_id == subscription && r.snapshot_id == snapshot)
        {
            if existing.reopen(max_attempts) {
                return Claim::Reopened(existing.clone());
            }
            return Claim::Existing(existing.clone());
        }

        self.next_id += 1;
        let record = NotificationRecord::new(self.next_id, subscription, snapshot);
        self.records.push(record.clone());
        Claim::Created(record)
    }

    pub fn save(&mut self, record: &NotificationRecord) -> Result<()> {
        let existing = self
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| {
                AppError::storage(format!("Unknown notification record {}", record.id))
            })?;
        if existing.subscription_id != record.subscription_id
            || existing.snapshot_id != record.snapshot_id
        {
            return Err(AppError::storage(format!(
                "Notification record {} cannot change its (subscription, snapshot) pair",
                record.id
            )));
        }
        *existing = record.clone();
        Ok(())
    }

    /// Most recent record of `subscription` for a snapshot older than `before`,
    /// in any state.
    pub fn latest_record(
        &self,
        subscription: SubscriptionId,
        before: SnapshotId,
    ) -> Option<NotificationRecord> {
        self.records
            .iter()
            .filter(|r| r.subscription_id == subscription && r.snapshot_id < before)
            .max_by_key(|r| r.snapshot_id)
            .cloned()
    }

    pub fn for_snapshot(&self, snapshot: SnapshotId) -> Vec<NotificationRecord> {
        self.records
            .iter()
            .filter(|r| r.snapshot_id == snapshot)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DispatchState;

    #[test]
    fn test_index_orders_and_filters_completed() {
        let mut index = SnapshotIndex::default();
        let mut a = index.begin("paws");
        let b = index.begin("paws");
        let mut c = index.begin("other");
        assert!(a.created_at < b.created_at);
        assert!(b.created_at < c.created_at);

        a.status = SnapshotStatus::Completed;
        index.complete(&a).unwrap();
        c.status = SnapshotStatus::Completed;
        index.complete(&c).unwrap();

        // b is still running
        assert_eq!(index.latest("paws").map(|e| e.id), Some(a.id));
        assert_eq!(index.previous("paws", b.id + 10).map(|e| e.id), Some(a.id));
        assert!(index.previous("paws", a.id).is_none());
        assert_eq!(index.history("paws").len(), 2);
    }

    #[test]
    fn test_index_rejects_second_completion() {
        let mut index = SnapshotIndex::default();
        let mut a = index.begin("paws");
        a.status = SnapshotStatus::Completed;
        index.complete(&a).unwrap();
        assert!(matches!(index.complete(&a), Err(AppError::Storage(_))));
    }

    #[test]
    fn test_claim_is_unique_per_pair() {
        let mut ledger = LedgerState::default();
        assert!(matches!(ledger.claim(1, 10, 3), Claim::Created(_)));
        assert!(matches!(ledger.claim(1, 10, 3), Claim::Existing(_)));
        assert!(matches!(ledger.claim(2, 10, 3), Claim::Created(_)));
        assert_eq!(ledger.records.len(), 2);
    }

    #[test]
    fn test_claim_reopens_failed() {
        let mut ledger = LedgerState::default();
        let Claim::Created(mut record) = ledger.claim(1, 10, 2) else {
            panic!("expected a new record");
        };
        record.finish(DispatchState::Failed);
        ledger.save(&record).unwrap();

        assert!(matches!(ledger.claim(1, 10, 2), Claim::Reopened(_)));
        // A concurrent second claim sees the re-opened record as in progress
        assert!(matches!(ledger.claim(1, 10, 2), Claim::Existing(_)));
    }

    #[test]
    fn test_latest_record_ignores_state_and_newer() {
        let mut ledger = LedgerState::default();
        for (snapshot, state) in [
            (1, DispatchState::Sent),
            (2, DispatchState::Skipped),
            (3, DispatchState::Failed),
            (5, DispatchState::Sent),
        ] {
            let Claim::Created(mut record) = ledger.claim(7, snapshot, 3) else {
                panic!("expected a new record");
            };
            record.finish(state);
            ledger.save(&record).unwrap();
        }
        ledger.claim(7, 4, 3);

        let found = ledger.latest_record(7, 5).unwrap();
        assert_eq!(found.snapshot_id, 4);
        assert_eq!(found.state, DispatchState::Recorded);
        assert_eq!(ledger.latest_record(7, 4).unwrap().state, DispatchState::Failed);
        assert_eq!(ledger.latest_record(7, SnapshotId::MAX).unwrap().snapshot_id, 5);
        assert!(ledger.latest_record(7, 1).is_none());
        assert!(ledger.latest_record(8, 5).is_none());
    }

    #[test]
    fn test_subscribe_is_idempotent_per_pair() {
        let mut dir = DirectoryState::default();
        dir.add_shelter(Shelter::new("Paws", None)).unwrap();
        dir.upsert_subscriber(Subscriber {
            id: "ada".into(),
            name: "Ada".into(),
            email: None,
            phone: None,
        });

        let first = dir.subscribe("ada", "paws", vec![]).unwrap();
        assert_eq!(first.channels, vec![ChannelKind::Email]);
        let second = dir
            .subscribe("ada", "paws", vec![ChannelKind::Sms, ChannelKind::Email, ChannelKind::Sms])
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.channels, vec![ChannelKind::Email, ChannelKind::Sms]);
        assert_eq!(dir.subscriptions_for("paws").len(), 1);

        assert!(dir.unsubscribe("ada", "paws"));
        assert!(!dir.unsubscribe("ada", "paws"));
    }

    #[test]
    fn test_add_shelter_rejects_duplicate_slug() {
        let mut dir = DirectoryState::default();
        dir.add_shelter(Shelter::new("Happy Tails", None)).unwrap();
        assert!(dir.add_shelter(Shelter::new("happy tails", None)).is_err());
        assert!(dir.add_shelter(Shelter::new("!!!", None)).is_err());
    }
}
