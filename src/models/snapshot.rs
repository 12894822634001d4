//! Scrape snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ListingRecord;

/// Snapshot ids are assigned in creation order.
pub type SnapshotId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Pending,
    Running,
    Completed,
}

/// One scrape execution for a shelter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: SnapshotId,

    /// Shelter slug
    pub shelter: String,

    pub created_at: DateTime<Utc>,

    pub status: SnapshotStatus,

    #[serde(default)]
    pub records: Vec<ListingRecord>,

    /// Error descriptors reported by the scrape source
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Snapshot {
    pub fn is_completed(&self) -> bool {
        self.status == SnapshotStatus::Completed
    }

    /// Nothing was scraped and the source reported errors.
    pub fn is_degraded(&self) -> bool {
        self.records.is_empty() && !self.errors.is_empty()
    }
}

/// Lightweight index entry for a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMeta {
    pub id: SnapshotId,
    pub shelter: String,
    pub created_at: DateTime<Utc>,
    pub status: SnapshotStatus,
    pub record_count: usize,
    pub error_count: usize,
}

impl From<&Snapshot> for SnapshotMeta {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id,
            shelter: snapshot.shelter.clone(),
            created_at: snapshot.created_at,
            status: snapshot.status,
            record_count: snapshot.records.len(),
            error_count: snapshot.errors.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_requires_errors() {
        let mut snapshot = Snapshot {
            id: 1,
            shelter: "paws".into(),
            created_at: Utc::now(),
            status: SnapshotStatus::Completed,
            records: vec![],
            errors: vec![],
        };
        assert!(!snapshot.is_degraded());

        snapshot.errors.push("timeout".into());
        assert!(snapshot.is_degraded());

        snapshot.records.push(ListingRecord::default());
        assert!(!snapshot.is_degraded());
    }

    #[test]
    fn test_meta_counts() {
        let snapshot = Snapshot {
            id: 7,
            shelter: "paws".into(),
            created_at: Utc::now(),
            status: SnapshotStatus::Running,
            records: vec![ListingRecord::default(); 3],
            errors: vec!["x".into()],
        };
        let meta = SnapshotMeta::from(&snapshot);
        assert_eq!(meta.record_count, 3);
        assert_eq!(meta.error_count, 1);
        assert_eq!(meta.status, SnapshotStatus::Running);
    }
}
