//! Scrape stage: one snapshot per shelter.

use std::time::Instant;

use crate::error::Result;
use crate::models::{Shelter, SnapshotId};
use crate::pipeline::guard::{SnapshotGuard, SnapshotHealth};
use crate::services::{ScrapeOutput, ScrapeSource};
use crate::storage::{Directory, SnapshotStore};

/// What one shelter's scrape produced.
#[derive(Debug, Clone)]
pub struct ScrapeStats {
    pub shelter: String,
    pub snapshot_id: SnapshotId,
    pub record_count: usize,
    pub error_count: usize,
    pub health: SnapshotHealth,
}

/// Scrape every shelter (or only `only`), storing a completed snapshot each.
///
/// Source failures end up as error descriptors on an empty snapshot.
/// Storage failures abort.
pub async fn run_scrape(
    directory: &dyn Directory,
    snapshots: &dyn SnapshotStore,
    source: &dyn ScrapeSource,
    guard: &SnapshotGuard,
    only: Option<&str>,
) -> Result<Vec<ScrapeStats>> {
    let started = Instant::now();
    let shelters: Vec<Shelter> = directory
        .shelters()
        .await?
        .into_iter()
        .filter(|s| only.is_none_or(|slug| s.slug == slug))
        .collect();

    if shelters.is_empty() {
        log::warn!("No shelters to scrape");
    }

    let mut stats = Vec::with_capacity(shelters.len());
    for shelter in &shelters {
        let snapshot = snapshots.begin(&shelter.slug).await?;
        log::info!("Scraping {} (snapshot {})", shelter.slug, snapshot.id);

        let output = match source.scrape(shelter).await {
            Ok(output) => output,
            Err(e) => {
                log::error!("{}", e);
                ScrapeOutput {
                    records: Vec::new(),
                    errors: vec![e.to_string()],
                }
            }
        };
        for error in &output.errors {
            log::warn!("  {}: {}", shelter.slug, error);
        }

        let snapshot = snapshots
            .complete(snapshot.id, output.records, output.errors)
            .await?;
        let previous = snapshots.previous(&shelter.slug, &snapshot).await?;
        let health = guard.inspect(&snapshot, previous.as_ref());

        stats.push(ScrapeStats {
            shelter: shelter.slug.clone(),
            snapshot_id: snapshot.id,
            record_count: snapshot.records.len(),
            error_count: snapshot.errors.len(),
            health,
        });
    }

    log::info!(
        "Scraped {} shelters in {:.2}s",
        stats.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::AppError;
    use crate::models::ListingRecord;
    use crate::storage::MemoryStore;

    struct StubSource;

    #[async_trait]
    impl ScrapeSource for StubSource {
        async fn scrape(&self, shelter: &Shelter) -> Result<ScrapeOutput> {
            match shelter.slug.as_str() {
                "paws" => Ok(ScrapeOutput {
                    records: vec![ListingRecord {
                        description: Some("A".into()),
                        ..Default::default()
                    }],
                    errors: vec!["page 2 missing".into()],
                }),
                _ => Err(AppError::scrape(&shelter.slug, "site down")),
            }
        }
    }

    #[tokio::test]
    async fn test_source_failure_still_completes_snapshot() {
        let store = MemoryStore::new();
        store.add_shelter(Shelter::new("Paws", None)).await.unwrap();
        store.add_shelter(Shelter::new("Down", None)).await.unwrap();

        let stats = run_scrape(&store, &store, &StubSource, &SnapshotGuard::default(), None)
            .await
            .unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].record_count, 1);
        assert_eq!(stats[0].error_count, 1);

        let down = store.latest("down").await.unwrap().unwrap();
        assert!(down.is_degraded());
        assert_eq!(down.errors, vec!["Scrape error for down: site down".to_string()]);
        assert!(!stats[1].health.is_healthy());
    }

    #[tokio::test]
    async fn test_filter_by_shelter() {
        let store = MemoryStore::new();
        store.add_shelter(Shelter::new("Paws", None)).await.unwrap();
        store.add_shelter(Shelter::new("Down", None)).await.unwrap();

        let stats = run_scrape(
            &store,
            &store,
            &StubSource,
            &SnapshotGuard::default(),
            Some("paws"),
        )
        .await
        .unwrap();
        assert_eq!(stats.len(), 1);
        assert!(store.latest("down").await.unwrap().is_none());
    }
}
