//! Notification records: the per-(subscription, snapshot) idempotency ledger entry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChannelKind, SnapshotId, SubscriptionId};

pub type RecordId = u64;

/// Dispatch state of a (subscription, snapshot) pair.
///
/// A pair without a record has not been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchState {
    /// Claimed; a send may be in flight
    Recorded,
    Sent,
    Skipped,
    Failed,
}

/// One error observed while processing a pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelKind>,

    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: RecordId,
    pub subscription_id: SubscriptionId,

    /// The "latest" side of the comparison
    pub snapshot_id: SnapshotId,

    /// Snapshot each channel is compared against, once resolved
    #[serde(default)]
    pub baselines: BTreeMap<ChannelKind, SnapshotId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: DispatchState,
    pub attempts: u32,

    #[serde(default)]
    pub new_listing_count: usize,

    /// Successful delivery time per channel
    #[serde(default)]
    pub delivered: BTreeMap<ChannelKind, DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

/// Outcome of claiming a (subscription, snapshot) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// No record existed; this writer owns the new one.
    Created(NotificationRecord),
    /// A failed record was re-opened for another attempt.
    Reopened(NotificationRecord),
    /// Someone else owns the pair, or it is already resolved.
    Existing(NotificationRecord),
}

impl NotificationRecord {
    /// Fresh record in the `Recorded` state.
    pub fn new(id: RecordId, subscription_id: SubscriptionId, snapshot_id: SnapshotId) -> Self {
        let now = Utc::now();
        Self {
            id,
            subscription_id,
            snapshot_id,
            baselines: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            state: DispatchState::Recorded,
            attempts: 1,
            new_listing_count: 0,
            delivered: BTreeMap::new(),
            skip_reason: None,
            errors: Vec::new(),
        }
    }

    /// Sent or skipped; never processed again.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, DispatchState::Sent | DispatchState::Skipped)
    }

    pub fn baseline_for(&self, channel: ChannelKind) -> Option<SnapshotId> {
        self.baselines.get(&channel).copied()
    }

    pub fn delivered_on(&self, channel: ChannelKind) -> bool {
        self.delivered.contains_key(&channel)
    }

    pub fn mark_delivered(&mut self, channel: ChannelKind) {
        let now = Utc::now();
        self.delivered.insert(channel, now);
        self.updated_at = now;
    }

    pub fn push_error(&mut self, channel: Option<ChannelKind>, message: impl Into<String>) {
        let now = Utc::now();
        self.errors.push(ErrorEntry {
            at: now,
            channel,
            message: message.into(),
        });
        self.updated_at = now;
    }

    pub fn finish(&mut self, state: DispatchState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skip_reason = Some(reason.into());
        self.finish(DispatchState::Skipped);
    }

    /// Move a failed record back to `Recorded` for another attempt.
    ///
    /// Storage backends call this under their uniqueness lock, so only one
    /// writer can win the re-open.
    pub fn reopen(&mut self, max_attempts: u32) -> bool {
        if self.state != DispatchState::Failed || self.attempts >= max_attempts {
            return false;
        }
        self.attempts += 1;
        self.skip_reason = None;
        self.finish(DispatchState::Recorded);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_unresolved() {
        let record = NotificationRecord::new(1, 10, 100);
        assert_eq!(record.state, DispatchState::Recorded);
        assert_eq!(record.attempts, 1);
        assert!(!record.is_resolved());
    }

    #[test]
    fn test_reopen_only_failed_records() {
        let mut record = NotificationRecord::new(1, 10, 100);
        assert!(!record.reopen(3));

        record.finish(DispatchState::Sent);
        assert!(!record.reopen(3));

        record.finish(DispatchState::Failed);
        assert!(record.reopen(3));
        assert_eq!(record.state, DispatchState::Recorded);
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn test_reopen_respects_max_attempts() {
        let mut record = NotificationRecord::new(1, 10, 100);
        record.finish(DispatchState::Failed);
        assert!(record.reopen(2));
        record.finish(DispatchState::Failed);
        assert!(!record.reopen(2));
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn test_delivered_map_serializes_channel_keys() {
        let mut record = NotificationRecord::new(1, 10, 100);
        record.mark_delivered(ChannelKind::Sms);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["delivered"].get("sms").is_some());

        let back: NotificationRecord = serde_json::from_value(json).unwrap();
        assert!(back.delivered_on(ChannelKind::Sms));
        assert_eq!(back.baseline_for(ChannelKind::Sms), None);
        assert!(!back.delivered_on(ChannelKind::Email));
    }
}
