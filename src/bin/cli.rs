//! kittyalert CLI
//!
//! Local execution entry point. All state lives under `--storage-dir`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kittyalert::{
    config,
    error::{AppError, Result},
    models::{ChannelKind, Shelter, Snapshot, SnapshotId, Subscriber},
    pipeline::{self, Dispatcher, ListingDiffer, SnapshotGuard},
    services::{ChannelSet, FileSource},
    storage::{Directory, LocalStorage, NotificationLedger, SnapshotStore},
};

/// kittyalert - new shelter listing alerts
#[derive(Parser, Debug)]
#[command(
    name = "kittyalert",
    version,
    about = "Detects newly listed shelter animals and notifies subscribers"
)]
struct Cli {
    /// Path to storage directory containing config and data files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config.toml
    Init,

    /// Take a snapshot of every shelter from the exported scrape results
    Scrape {
        /// Only this shelter
        #[arg(long)]
        shelter: Option<String>,
    },

    /// Notify subscribers about the latest snapshots
    Notify {
        /// Only this shelter
        #[arg(long)]
        shelter: Option<String>,

        /// Dispatch this snapshot instead of the latest
        #[arg(long, conflicts_with = "shelter")]
        snapshot: Option<SnapshotId>,
    },

    /// Run full pipeline: Scrape → Notify
    Pipeline {
        /// Only this shelter
        #[arg(long)]
        shelter: Option<String>,
    },

    /// Show what changed between two snapshots of a shelter
    Diff {
        shelter: String,

        /// Baseline snapshot (default: the one before `--to`)
        #[arg(long)]
        from: Option<SnapshotId>,

        /// Target snapshot (default: latest)
        #[arg(long)]
        to: Option<SnapshotId>,
    },

    /// Register a shelter
    AddShelter {
        name: String,

        /// Public listing page
        #[arg(long)]
        url: Option<String>,
    },

    /// Add or update a subscriber
    AddSubscriber {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// E.164 phone number, e.g. +15551234567
        #[arg(long)]
        phone: Option<String>,
    },

    /// Subscribe to a shelter
    Subscribe {
        subscriber: String,
        shelter: String,

        /// Channels to deliver on (repeatable; default: email)
        #[arg(long = "channel")]
        channels: Vec<ChannelKind>,
    },

    /// Remove a subscription
    Unsubscribe { subscriber: String, shelter: String },

    /// Validate configuration files
    Validate,

    /// Show shelters, subscriptions, and snapshot info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

async fn load_snapshot(storage: &LocalStorage, id: SnapshotId) -> Result<Snapshot> {
    storage
        .get(id)
        .await?
        .ok_or_else(|| AppError::validation(format!("Unknown snapshot {id}")))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::Init = cli.command {
        let path = config::write_default_config(&cli.storage_dir)?;
        log::info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = config::load_config(&cli.storage_dir)?;
    log::debug!("Loaded configuration from {}", cli.storage_dir.display());

    let storage = Arc::new(LocalStorage::new(&cli.storage_dir));

    match cli.command {
        Command::Init => {}

        Command::Scrape { shelter } => {
            let source = FileSource::new(config::source_dir(&config, &cli.storage_dir));
            let guard = SnapshotGuard::new(config.guard.clone());
            let stats = pipeline::run_scrape(
                storage.as_ref(),
                storage.as_ref(),
                &source,
                &guard,
                shelter.as_deref(),
            )
            .await?;

            for s in &stats {
                log::info!(
                    "{}: snapshot {} with {} listings, {} errors",
                    s.shelter,
                    s.snapshot_id,
                    s.record_count,
                    s.error_count
                );
            }
        }

        Command::Notify { shelter, snapshot } => {
            let channels = ChannelSet::from_config(&config)?;
            let dispatcher =
                Dispatcher::from_backend(Arc::clone(&storage), channels).with_config(&config);

            let summary = match snapshot {
                Some(id) => {
                    let target = load_snapshot(&storage, id).await?;
                    dispatcher.run(&target).await?
                }
                None => dispatcher.run_latest(shelter.as_deref()).await?,
            };

            log::info!(
                "Sent {}, skipped {}, failed {} ({} new listings)",
                summary.sent_count,
                summary.skipped_count,
                summary.failed_count,
                summary.new_listing_count
            );
        }

        Command::Pipeline { shelter } => {
            let source = FileSource::new(config::source_dir(&config, &cli.storage_dir));
            let channels = ChannelSet::from_config(&config)?;
            pipeline::run_pipeline(
                &config,
                Arc::clone(&storage),
                &source,
                channels,
                shelter.as_deref(),
            )
            .await?;
        }

        Command::Diff { shelter, from, to } => {
            let target = match to {
                Some(id) => load_snapshot(&storage, id).await?,
                None => storage.latest(&shelter).await?.ok_or_else(|| {
                    AppError::validation(format!("No completed snapshot for '{shelter}'"))
                })?,
            };
            let baseline = match from {
                Some(id) => Some(load_snapshot(&storage, id).await?),
                None => storage.previous(&shelter, &target).await?,
            };

            let differ = ListingDiffer::with_strategy(config.identity.strategy);
            let previous = baseline.as_ref().map_or(&[][..], |s| s.records.as_slice());
            let diff = differ.calculate(previous, &target.records);

            log::info!(
                "Snapshot {} against {}: {} new, {} removed, {} unchanged",
                target.id,
                baseline
                    .as_ref()
                    .map_or("nothing".to_string(), |s| s.id.to_string()),
                diff.added.len(),
                diff.removed.len(),
                diff.unchanged
            );
            for record in &diff.added {
                log::info!("  + {}", record.display_name());
            }
            for record in &diff.removed {
                log::info!("  - {}", record.display_name());
            }
        }

        Command::AddShelter { name, url } => {
            if let Some(url) = &url {
                url::Url::parse(url)?;
            }
            let shelter = storage.add_shelter(Shelter::new(name, url)).await?;
            log::info!("Added shelter {} ({})", shelter.name, shelter.slug);
        }

        Command::AddSubscriber {
            id,
            name,
            email,
            phone,
        } => {
            let subscriber = Subscriber {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                email,
                phone,
            };
            for kind in ChannelKind::ALL {
                if subscriber.address_for(kind).is_none() {
                    log::warn!(
                        "{} has no usable {} address; that channel will be skipped",
                        subscriber.id,
                        kind
                    );
                }
            }
            storage.upsert_subscriber(subscriber.clone()).await?;
            log::info!("Saved subscriber {}", subscriber.id);
        }

        Command::Subscribe {
            subscriber,
            shelter,
            channels,
        } => {
            let subscription = storage.subscribe(&subscriber, &shelter, channels).await?;
            log::info!(
                "Subscription {}: {} → {} via {:?}",
                subscription.id,
                subscription.subscriber_id,
                subscription.shelter,
                subscription.channels
            );
        }

        Command::Unsubscribe {
            subscriber,
            shelter,
        } => {
            if storage.unsubscribe(&subscriber, &shelter).await? {
                log::info!("Unsubscribed {} from {}", subscriber, shelter);
            } else {
                log::warn!("{} was not subscribed to {}", subscriber, shelter);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            ChannelSet::from_config(&config)?;
            log::info!("✓ Config OK");

            for shelter in storage.shelters().await? {
                for subscription in storage.subscriptions_for(&shelter.slug).await? {
                    match storage.subscriber(&subscription.subscriber_id).await? {
                        Some(subscriber) => {
                            for &kind in &subscription.channels {
                                if subscriber.address_for(kind).is_none() {
                                    log::warn!(
                                        "{} wants {} for {} but has no usable address",
                                        subscriber.id,
                                        kind,
                                        shelter.slug
                                    );
                                }
                            }
                        }
                        None => log::warn!(
                            "Subscription {} names unknown subscriber {}",
                            subscription.id,
                            subscription.subscriber_id
                        ),
                    }
                }
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            let shelters = storage.shelters().await?;
            if shelters.is_empty() {
                log::info!("No shelters registered yet.");
            }
            for shelter in shelters {
                let subscriptions = storage.subscriptions_for(&shelter.slug).await?;
                log::info!(
                    "{} ({}): {} subscriptions",
                    shelter.name,
                    shelter.slug,
                    subscriptions.len()
                );

                let history = storage.history(&shelter.slug).await?;
                match history.last() {
                    Some(meta) => log::info!(
                        "  {} snapshots; last #{} at {} ({:?}, {} listings, {} errors)",
                        history.len(),
                        meta.id,
                        meta.created_at,
                        meta.status,
                        meta.record_count,
                        meta.error_count
                    ),
                    None => log::info!("  No snapshot found yet."),
                }

                if let Some(latest) = storage.latest(&shelter.slug).await? {
                    let records = storage.records_for_snapshot(latest.id).await?;
                    log::info!(
                        "  Latest snapshot #{}: {} notification records",
                        latest.id,
                        records.len()
                    );
                }
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
