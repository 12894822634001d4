// src/pipeline/pipeline.rs

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::services::{ChannelSet, ScrapeSource};
use crate::storage::Backend;

use super::dispatch::{Dispatcher, RunSummary};
use super::guard::SnapshotGuard;
use super::scrape::{ScrapeStats, run_scrape};

/// Outcome of a scrape-then-notify run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub scrape: Vec<ScrapeStats>,
    pub notify: RunSummary,
}

/// Run the full pipeline: scrape every shelter, then dispatch each fresh snapshot.
pub async fn run_pipeline<B: Backend + 'static>(
    config: &Config,
    backend: Arc<B>,
    source: &dyn ScrapeSource,
    channels: ChannelSet,
    only: Option<&str>,
) -> Result<PipelineReport> {
    log::info!("Step 1/2: Scrape");
    let guard = SnapshotGuard::new(config.guard.clone());
    let scrape = run_scrape(backend.as_ref(), backend.as_ref(), source, &guard, only).await?;

    log::info!("Step 2/2: Notify");
    let dispatcher = Dispatcher::from_backend(Arc::clone(&backend), channels).with_config(config);
    let mut notify = RunSummary::default();
    for stats in &scrape {
        let snapshot = backend
            .get(stats.snapshot_id)
            .await?
            .ok_or_else(|| AppError::storage(format!("Snapshot {} vanished", stats.snapshot_id)))?;
        notify.merge(dispatcher.run(&snapshot).await?);
    }

    log::info!(
        "Pipeline complete: {} snapshots, {} sent, {} skipped, {} failed",
        scrape.len(),
        notify.sent_count,
        notify.skipped_count,
        notify.failed_count
    );
    Ok(PipelineReport { scrape, notify })
}
