//! Diff calculation between listing snapshots.
//!
//! A listing in the latest snapshot is new when its identity key is absent
//! from the baseline. Listings that vanish from the latest snapshot are
//! reported as removed (most likely adopted) but never notified.

use std::collections::HashSet;

use crate::models::{IdentityStrategy, ListingKey, ListingRecord};

/// Result of comparing two snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    /// New listings, in latest-snapshot order
    pub added: Vec<ListingRecord>,
    /// Keys of `added`, index-aligned
    pub added_keys: Vec<ListingKey>,
    /// Baseline listings missing from the latest snapshot
    pub removed: Vec<ListingRecord>,
    /// Distinct listings present in both
    pub unchanged: usize,
}

impl DiffResult {
    /// Check if anything new showed up.
    pub fn has_new(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Calculator for computing diffs between snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListingDiffer {
    strategy: IdentityStrategy,
}

impl ListingDiffer {
    /// Create a differ using the default identity strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a differ with an explicit identity strategy.
    pub fn with_strategy(strategy: IdentityStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> IdentityStrategy {
        self.strategy
    }

    /// Calculate the diff between a baseline and the latest snapshot.
    pub fn calculate(&self, previous: &[ListingRecord], latest: &[ListingRecord]) -> DiffResult {
        let (prev_keys, prev_unique) = self.dedupe(previous);
        let (latest_keys, latest_unique) = self.dedupe(latest);

        let prev_set: HashSet<&ListingKey> = prev_keys.iter().collect();
        let latest_set: HashSet<&ListingKey> = latest_keys.iter().collect();

        let mut result = DiffResult::default();

        for (key, record) in latest_keys.iter().zip(latest_unique) {
            if prev_set.contains(key) {
                result.unchanged += 1;
            } else {
                result.added_keys.push(key.clone());
                result.added.push(record.clone());
            }
        }

        result.removed = prev_keys
            .iter()
            .zip(prev_unique)
            .filter(|(key, _)| !latest_set.contains(key))
            .map(|(_, record)| record.clone())
            .collect();

        result
    }

    /// Keep the first record for each identity key, in order.
    fn dedupe<'a>(&self, records: &'a [ListingRecord]) -> (Vec<ListingKey>, Vec<&'a ListingRecord>) {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut unique = Vec::new();
        for record in records {
            let key = record.identity_key(self.strategy);
            if seen.insert(key.clone()) {
                keys.push(key);
                unique.push(record);
            }
        }
        (keys, unique)
    }
}

/// Convenience function: the new listings between two snapshots.
pub fn diff_listings(previous: &[ListingRecord], latest: &[ListingRecord]) -> Vec<ListingRecord> {
    ListingDiffer::new().calculate(previous, latest).added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(description: &str) -> ListingRecord {
        ListingRecord {
            name: Some(format!("Cat {}", description)),
            description: Some(description.to_string()),
            ..Default::default()
        }
    }

    fn descriptions(records: &[ListingRecord]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r.description.as_deref().unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_no_changes() {
        let prev = vec![listing("A"), listing("B")];
        let result = ListingDiffer::new().calculate(&prev, &prev);
        assert!(!result.has_new());
        assert!(result.removed.is_empty());
        assert_eq!(result.unchanged, 2);
    }

    #[test]
    fn test_additions_keep_latest_order() {
        let prev = vec![listing("A"), listing("B")];
        let curr = vec![listing("D"), listing("A"), listing("B"), listing("C")];

        let added = diff_listings(&prev, &curr);
        assert_eq!(descriptions(&added), vec!["D", "C"]);
    }

    #[test]
    fn test_happy_tails_scenario() {
        let s1 = vec![listing("A"), listing("B")];
        let s2 = vec![listing("A"), listing("B"), listing("C")];
        assert_eq!(diff_listings(&s1, &s2), vec![listing("C")]);
    }

    #[test]
    fn test_removals() {
        let prev = vec![listing("A"), listing("B")];
        let curr = vec![listing("A")];

        let result = ListingDiffer::new().calculate(&prev, &curr);
        assert!(!result.has_new());
        assert_eq!(descriptions(&result.removed), vec!["B"]);
    }

    #[test]
    fn test_same_key_with_changed_fields_is_not_new() {
        let prev = vec![listing("A")];
        let mut renamed = listing("A");
        renamed.name = Some("Renamed".into());
        renamed.age = Some("2 years".into());

        assert!(diff_listings(&prev, &[renamed]).is_empty());
    }

    #[test]
    fn test_empty_to_full_dedupes() {
        let curr = vec![listing("A"), listing("B"), listing("A")];
        let added = diff_listings(&[], &curr);
        assert_eq!(descriptions(&added), vec!["A", "B"]);
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let mut first = listing("X");
        first.name = Some("First".into());
        let mut second = listing("X");
        second.name = Some("Second".into());

        let result = ListingDiffer::new().calculate(&[], &[first, second]);
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].display_name(), "First");
        assert_eq!(result.added_keys.len(), 1);
    }

    #[test]
    fn test_full_to_empty() {
        let prev = vec![listing("A")];
        let result = ListingDiffer::new().calculate(&prev, &[]);
        assert!(result.added.is_empty());
        assert_eq!(result.removed.len(), 1);
    }

    #[test]
    fn test_self_diff_is_empty_for_varied_inputs() {
        let cases = vec![
            vec![],
            vec![listing("A")],
            vec![listing("A"), listing("A"), listing("B")],
            vec![ListingRecord::default(), ListingRecord::default()],
        ];
        for case in cases {
            assert!(diff_listings(&case, &case).is_empty());
        }
    }

    #[test]
    fn test_composite_strategy_sees_edited_description_as_same() {
        let mut before = listing("Loves naps");
        before.breed = Some("Tabby".into());
        let mut after = before.clone();
        after.description = Some("Loves naps and treats".into());

        let composite = ListingDiffer::with_strategy(IdentityStrategy::Composite);
        assert!(!composite.calculate(&[before.clone()], &[after.clone()]).has_new());

        let default = ListingDiffer::new();
        assert!(default.calculate(&[before], &[after]).has_new());
    }
}
