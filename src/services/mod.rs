//! External collaborators of the pipeline.
//!
//! - Delivery channels (`Channel`, `LogChannel`, `WebhookChannel`)
//! - Scrape sources (`ScrapeSource`, `FileSource`)

mod channels;
mod source;

pub use channels::{Channel, ChannelSet, LogChannel, WebhookChannel};
pub use source::{FileSource, ScrapeOutput, ScrapeSource};
