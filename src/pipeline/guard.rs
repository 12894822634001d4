//! Snapshot health check.
//!
//! Compares a fresh snapshot with its predecessor to flag scrapes that most
//! likely broke (the page layout changed, the site was down) instead of
//! the shelter suddenly emptying out.

use crate::models::{GuardConfig, Snapshot};

/// Health of a snapshot relative to its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotHealth {
    /// Record count is in line with the previous snapshot
    Healthy {
        current_count: usize,
        previous_count: usize,
    },
    /// No previous snapshot, or too few records to judge
    ColdStart { current_count: usize },
    /// Record count dropped beyond the threshold
    Dropped {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
    /// Nothing was scraped
    Empty { error_count: usize },
}

impl SnapshotHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(
            self,
            SnapshotHealth::Healthy { .. } | SnapshotHealth::ColdStart { .. }
        )
    }
}

/// Guard for spotting broken scrapes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGuard {
    config: GuardConfig,
}

impl SnapshotGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Classify `current` against the snapshot before it, if any.
    pub fn check(&self, current: &Snapshot, previous: Option<&Snapshot>) -> SnapshotHealth {
        let current_count = current.records.len();
        let previous_count = previous.map_or(0, |p| p.records.len());

        if current_count == 0 {
            if previous_count == 0 && current.errors.is_empty() {
                return SnapshotHealth::ColdStart { current_count };
            }
            return SnapshotHealth::Empty {
                error_count: current.errors.len(),
            };
        }

        if previous_count < self.config.min_baseline {
            return SnapshotHealth::ColdStart { current_count };
        }

        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;

            if drop_percent > self.config.max_drop_percent as f64 {
                return SnapshotHealth::Dropped {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        SnapshotHealth::Healthy {
            current_count,
            previous_count,
        }
    }

    /// Check and log the verdict.
    pub fn inspect(&self, current: &Snapshot, previous: Option<&Snapshot>) -> SnapshotHealth {
        let health = self.check(current, previous);
        match &health {
            SnapshotHealth::Healthy {
                current_count,
                previous_count,
            } => log::info!(
                "Snapshot {} healthy ({} listings, was {})",
                current.id,
                current_count,
                previous_count
            ),
            SnapshotHealth::ColdStart { current_count } => log::info!(
                "Snapshot {} cold start ({} listings, first run or below baseline)",
                current.id,
                current_count
            ),
            SnapshotHealth::Dropped {
                current_count,
                previous_count,
                drop_percent,
            } => log::warn!(
                "Snapshot {} dropped {} → {} listings ({:.1}% > {}% threshold)",
                current.id,
                previous_count,
                current_count,
                drop_percent,
                self.config.max_drop_percent
            ),
            SnapshotHealth::Empty { error_count } => log::warn!(
                "Snapshot {} is empty ({} scrape errors)",
                current.id,
                error_count
            ),
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingRecord, SnapshotStatus};
    use chrono::Utc;

    fn snapshot(count: usize, errors: usize) -> Snapshot {
        Snapshot {
            id: 1,
            shelter: "paws".into(),
            created_at: Utc::now(),
            status: SnapshotStatus::Completed,
            records: (0..count)
                .map(|i| ListingRecord {
                    description: Some(format!("cat {}", i)),
                    ..Default::default()
                })
                .collect(),
            errors: (0..errors).map(|i| format!("error {}", i)).collect(),
        }
    }

    #[test]
    fn test_healthy_small_drop() {
        let guard = SnapshotGuard::default();
        let health = guard.check(&snapshot(85, 0), Some(&snapshot(100, 0)));
        assert!(matches!(health, SnapshotHealth::Healthy { .. }));
    }

    #[test]
    fn test_large_drop() {
        let guard = SnapshotGuard::default();
        let health = guard.check(&snapshot(70, 0), Some(&snapshot(100, 0)));
        assert!(matches!(health, SnapshotHealth::Dropped { .. }));
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_cold_start_without_previous() {
        let guard = SnapshotGuard::default();
        assert!(matches!(
            guard.check(&snapshot(3, 0), None),
            SnapshotHealth::ColdStart { current_count: 3 }
        ));
    }

    #[test]
    fn test_empty_with_errors() {
        let guard = SnapshotGuard::default();
        assert_eq!(
            guard.check(&snapshot(0, 2), Some(&snapshot(4, 0))),
            SnapshotHealth::Empty { error_count: 2 }
        );
    }

    #[test]
    fn test_custom_threshold() {
        let guard = SnapshotGuard::new(GuardConfig {
            max_drop_percent: 10,
            min_baseline: 5,
        });
        let health = guard.check(&snapshot(8, 0), Some(&snapshot(10, 0)));
        assert!(matches!(health, SnapshotHealth::Dropped { .. }));
    }
}
