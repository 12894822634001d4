//! Pipeline stages.
//!
//! - `run_scrape`: take a snapshot of every shelter
//! - `Dispatcher`: notify subscribers about new listings in a snapshot
//! - `run_pipeline`: scrape, then notify

pub mod compose;
pub mod diff;
pub mod dispatch;
pub mod guard;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod scrape;

pub use compose::{Composer, Content};
pub use diff::{DiffResult, ListingDiffer, diff_listings};
pub use dispatch::{Dispatcher, Outcome, RunSummary, SkipReason, SubscriptionReport};
pub use guard::{SnapshotGuard, SnapshotHealth};
pub use pipeline::{PipelineReport, run_pipeline};
pub use scrape::{ScrapeStats, run_scrape};
