//! Scrape sources.
//!
//! HTML extraction happens elsewhere; a source only hands back the records it
//! found for a shelter plus any errors met on the way. Partial results are
//! normal.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{ListingRecord, Shelter};

/// Records and error descriptors from one scrape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeOutput {
    pub records: Vec<ListingRecord>,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait ScrapeSource: Send + Sync {
    /// An `Err` means nothing usable came back; the caller records it on the
    /// snapshot and moves on.
    async fn scrape(&self, shelter: &Shelter) -> Result<ScrapeOutput>;
}

/// Accepted export shapes: a bare list, or records with errors.
#[derive(Deserialize)]
#[serde(untagged)]
enum Export {
    Records(Vec<ListingRecord>),
    Full {
        #[serde(default)]
        records: Vec<ListingRecord>,
        #[serde(default)]
        errors: Vec<String>,
    },
}

/// Reads scraper exports from `{dir}/{slug}.json`.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, shelter: &Shelter) -> PathBuf {
        self.dir.join(format!("{}.json", shelter.slug))
    }
}

#[async_trait]
impl ScrapeSource for FileSource {
    async fn scrape(&self, shelter: &Shelter) -> Result<ScrapeOutput> {
        let path = self.path_for(shelter);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::scrape(&shelter.slug, format!("{}: {}", path.display(), e)))?;

        let export: Export = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::scrape(&shelter.slug, format!("{}: {}", path.display(), e)))?;

        let (records, mut errors) = match export {
            Export::Records(records) => (records, Vec::new()),
            Export::Full { records, errors } => (records, errors),
        };

        let mut kept = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            if record == ListingRecord::default() {
                errors.push(format!("record {} has no fields", i));
            } else {
                kept.push(record);
            }
        }

        Ok(ScrapeOutput {
            records: kept,
            errors,
        })
    }
}
