//! Notification dispatch.
//!
//! For every subscription of the target snapshot's shelter:
//!
//! 1. Claim the (subscription, snapshot) record before anything is sent.
//! 2. Resolve the subscriber's baseline snapshot, per channel.
//! 3. Diff each baseline against target, compose per channel, send.
//! 4. Record the outcome on the claimed record.
//!
//! Delivery failures stay inside the subscription's record. Storage
//! failures abort the run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::error::{AppError, Result};
use crate::models::{
    ChannelKind, Claim, Config, DispatchConfig, DispatchState, ListingRecord, NotificationRecord,
    Shelter, Snapshot, SnapshotId, Subscription, SubscriptionId,
};
use crate::pipeline::compose::Composer;
use crate::pipeline::diff::ListingDiffer;
use crate::services::ChannelSet;
use crate::storage::{Backend, Directory, NotificationLedger, SnapshotStore};

/// Why a subscription was not notified. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The pair was already sent or skipped by an earlier run
    AlreadyHandled,
    /// Another writer holds the pair, or a run was interrupted mid-send
    InProgress,
    /// The pair failed and has no attempts left
    AttemptsExhausted,
    /// A newer snapshot was already dispatched to the subscription
    Superseded,
    /// No earlier snapshot to compare against
    NoBaseline,
    NothingNew,
    /// No usable address for any requested channel
    MissingAddress,
    /// None of the requested channels is enabled
    ChannelDisabled,
    UnknownSubscriber,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyHandled => "already_handled",
            SkipReason::InProgress => "in_progress",
            SkipReason::AttemptsExhausted => "attempts_exhausted",
            SkipReason::Superseded => "superseded",
            SkipReason::NoBaseline => "no_baseline",
            SkipReason::NothingNew => "nothing_new",
            SkipReason::MissingAddress => "missing_address",
            SkipReason::ChannelDisabled => "channel_disabled",
            SkipReason::UnknownSubscriber => "unknown_subscriber",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    Skipped(SkipReason),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionReport {
    pub subscription_id: SubscriptionId,
    pub outcome: Outcome,
    /// Channels that delivered during this run
    pub delivered: Vec<ChannelKind>,
}

/// Counts for one or more dispatch runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sent_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    /// Listings new relative to the snapshot before the target
    pub new_listing_count: usize,
    pub reports: Vec<SubscriptionReport>,
}

impl RunSummary {
    fn record(&mut self, report: SubscriptionReport) {
        match report.outcome {
            Outcome::Sent => self.sent_count += 1,
            Outcome::Skipped(_) => self.skipped_count += 1,
            Outcome::Failed => self.failed_count += 1,
        }
        self.reports.push(report);
    }

    /// Fold another run's counts into this one.
    pub fn merge(&mut self, other: RunSummary) {
        self.sent_count += other.sent_count;
        self.skipped_count += other.skipped_count;
        self.failed_count += other.failed_count;
        self.new_listing_count += other.new_listing_count;
        self.reports.extend(other.reports);
    }
}

/// Per-run facts shared by every subscription.
struct RunContext<'a> {
    target: &'a Snapshot,
    shelter: &'a Shelter,
    default_baseline: Option<Snapshot>,
}

/// Orchestrates diff, compose, and delivery for a snapshot.
pub struct Dispatcher {
    snapshots: Arc<dyn SnapshotStore>,
    directory: Arc<dyn Directory>,
    ledger: Arc<dyn NotificationLedger>,
    channels: ChannelSet,
    differ: ListingDiffer,
    composer: Composer,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        directory: Arc<dyn Directory>,
        ledger: Arc<dyn NotificationLedger>,
        channels: ChannelSet,
    ) -> Self {
        Self {
            snapshots,
            directory,
            ledger,
            channels,
            differ: ListingDiffer::default(),
            composer: Composer::default(),
            config: DispatchConfig::default(),
        }
    }

    /// Dispatcher whose repositories all live in one backend.
    pub fn from_backend<B: Backend + 'static>(backend: Arc<B>, channels: ChannelSet) -> Self {
        Self::new(backend.clone(), backend.clone(), backend, channels)
    }

    /// Apply identity, compose, and dispatch settings.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.differ = ListingDiffer::with_strategy(config.identity.strategy);
        self.composer = Composer::new(config.compose.clone());
        self.config = config.dispatch.clone();
        self
    }

    /// Notify every subscriber of the target snapshot's shelter.
    pub async fn run(&self, target: &Snapshot) -> Result<RunSummary> {
        if !target.is_completed() {
            return Err(AppError::validation(format!(
                "Snapshot {} is not completed",
                target.id
            )));
        }
        let shelter = self
            .directory
            .shelter(&target.shelter)
            .await?
            .ok_or_else(|| AppError::validation(format!("Unknown shelter '{}'", target.shelter)))?;

        let default_baseline = match self.snapshots.previous(&shelter.slug, target).await? {
            Some(previous) => self.settle(previous).await?,
            None => None,
        };
        let new_listing_count = default_baseline.as_ref().map_or(0, |baseline| {
            self.differ
                .calculate(&baseline.records, &target.records)
                .added
                .len()
        });

        let subscriptions = self.directory.subscriptions_for(&shelter.slug).await?;
        log::info!(
            "Dispatching snapshot {} of {} to {} subscriptions ({} new listings)",
            target.id,
            shelter.slug,
            subscriptions.len(),
            new_listing_count
        );

        let ctx = RunContext {
            target,
            shelter: &shelter,
            default_baseline,
        };

        let reports: Vec<SubscriptionReport> = stream::iter(subscriptions)
            .map(|subscription| self.process(&ctx, subscription))
            .buffered(self.config.max_concurrent.max(1))
            .try_collect()
            .await?;

        let mut summary = RunSummary {
            new_listing_count,
            ..RunSummary::default()
        };
        for report in reports {
            summary.record(report);
        }

        log::info!(
            "Snapshot {}: {} sent, {} skipped, {} failed",
            target.id,
            summary.sent_count,
            summary.skipped_count,
            summary.failed_count
        );
        Ok(summary)
    }

    /// Run every shelter's latest snapshot, or only `shelter`'s.
    pub async fn run_latest(&self, shelter: Option<&str>) -> Result<RunSummary> {
        let shelters = match shelter {
            Some(slug) => vec![
                self.directory
                    .shelter(slug)
                    .await?
                    .ok_or_else(|| AppError::validation(format!("Unknown shelter '{slug}'")))?,
            ],
            None => self.directory.shelters().await?,
        };

        let mut summary = RunSummary::default();
        for shelter in shelters {
            match self.snapshots.latest(&shelter.slug).await? {
                Some(target) => summary.merge(self.run(&target).await?),
                None => log::info!("No completed snapshot for {}, skipping", shelter.slug),
            }
        }
        Ok(summary)
    }

    async fn process(
        &self,
        ctx: &RunContext<'_>,
        subscription: Subscription,
    ) -> Result<SubscriptionReport> {
        let target_id = ctx.target.id;
        let claim = self
            .ledger
            .claim(subscription.id, target_id, self.config.max_attempts)
            .await?;

        let mut record = match claim {
            Claim::Created(record) => record,
            Claim::Reopened(record) => {
                log::info!(
                    "Subscription {} snapshot {}: retrying (attempt {})",
                    subscription.id,
                    target_id,
                    record.attempts
                );
                record
            }
            Claim::Existing(record) => {
                let reason = match record.state {
                    DispatchState::Sent | DispatchState::Skipped => SkipReason::AlreadyHandled,
                    DispatchState::Failed => SkipReason::AttemptsExhausted,
                    DispatchState::Recorded => SkipReason::InProgress,
                };
                log::debug!(
                    "Subscription {} snapshot {}: left alone ({})",
                    subscription.id,
                    target_id,
                    reason
                );
                return Ok(report(&subscription, Outcome::Skipped(reason), Vec::new()));
            }
        };

        // A newer snapshot already carried this pair's listings forward
        if let Some(later) = self
            .ledger
            .latest_record(subscription.id, SnapshotId::MAX)
            .await?
        {
            if later.snapshot_id > target_id {
                return self
                    .skip(&subscription, &mut record, SkipReason::Superseded)
                    .await;
            }
        }

        let Some(subscriber) = self.directory.subscriber(&subscription.subscriber_id).await? else {
            return self
                .skip(&subscription, &mut record, SkipReason::UnknownSubscriber)
                .await;
        };

        let pending: Vec<ChannelKind> = subscription
            .channels
            .iter()
            .copied()
            .filter(|&kind| !record.delivered_on(kind))
            .collect();
        let baselines = self.resolve_baselines(ctx, &subscription, &pending, &record).await?;
        if !pending.is_empty() && baselines.is_empty() {
            return self
                .skip(&subscription, &mut record, SkipReason::NoBaseline)
                .await;
        }

        // Channels sharing a baseline share a diff
        let mut by_baseline: HashMap<SnapshotId, Vec<ListingRecord>> = HashMap::new();
        let mut added: BTreeMap<ChannelKind, Vec<ListingRecord>> = BTreeMap::new();
        for (&kind, baseline) in &baselines {
            let listings = by_baseline
                .entry(baseline.id)
                .or_insert_with(|| {
                    self.differ
                        .calculate(&baseline.records, &ctx.target.records)
                        .added
                })
                .clone();
            record.baselines.insert(kind, baseline.id);
            added.insert(kind, listings);
        }
        record.new_listing_count = added.values().map(Vec::len).max().unwrap_or(0);
        if !pending.is_empty() && record.new_listing_count == 0 {
            return self
                .skip(&subscription, &mut record, SkipReason::NothingNew)
                .await;
        }
        self.ledger.save(&record).await?;

        let mut delivered = Vec::new();
        let mut skips = Vec::new();
        let mut failures = 0;

        for &kind in &pending {
            let Some(channel) = self.channels.get(kind) else {
                skips.push(SkipReason::ChannelDisabled);
                continue;
            };
            let Some(address) = subscriber.address_for(kind) else {
                skips.push(SkipReason::MissingAddress);
                continue;
            };
            let Some(listings) = added.get(&kind) else {
                skips.push(SkipReason::NoBaseline);
                continue;
            };
            let content = self.composer.compose(kind, listings, ctx.shelter);
            if content.is_empty() {
                skips.push(SkipReason::NothingNew);
                continue;
            }

            match channel.send(address, &content).await {
                Ok(true) => {
                    record.mark_delivered(kind);
                    self.ledger.save(&record).await?;
                    delivered.push(kind);
                }
                Ok(false) => {
                    failures += 1;
                    let error = AppError::delivery(kind, "channel refused the message");
                    log::warn!("Subscription {}: {}", subscription.id, error);
                    record.push_error(Some(kind), error.to_string());
                }
                Err(e) => {
                    failures += 1;
                    log::warn!("Subscription {}: {}", subscription.id, e);
                    record.push_error(Some(kind), e.to_string());
                }
            }
        }

        let wanted_delivered = subscription
            .channels
            .iter()
            .any(|&kind| record.delivered_on(kind));

        let outcome = if failures > 0 {
            record.finish(DispatchState::Failed);
            Outcome::Failed
        } else if wanted_delivered {
            record.finish(DispatchState::Sent);
            Outcome::Sent
        } else {
            let reason = skips
                .first()
                .copied()
                .unwrap_or(SkipReason::ChannelDisabled);
            record.skip(reason.as_str());
            Outcome::Skipped(reason)
        };
        self.ledger.save(&record).await?;

        log::info!(
            "Subscription {} snapshot {}: {:?} ({} new, delivered {:?})",
            subscription.id,
            target_id,
            outcome,
            record.new_listing_count,
            delivered
        );
        Ok(report(&subscription, outcome, delivered))
    }

    async fn skip(
        &self,
        subscription: &Subscription,
        record: &mut NotificationRecord,
        reason: SkipReason,
    ) -> Result<SubscriptionReport> {
        record.skip(reason.as_str());
        self.ledger.save(record).await?;
        log::info!(
            "Subscription {} snapshot {}: skipped ({})",
            subscription.id,
            record.snapshot_id,
            reason
        );
        Ok(report(subscription, Outcome::Skipped(reason), Vec::new()))
    }

    /// Baseline snapshot for each pending channel. Channels without one are
    /// left out.
    async fn resolve_baselines(
        &self,
        ctx: &RunContext<'_>,
        subscription: &Subscription,
        pending: &[ChannelKind],
        record: &NotificationRecord,
    ) -> Result<BTreeMap<ChannelKind, Snapshot>> {
        let prior = self
            .ledger
            .latest_record(subscription.id, ctx.target.id)
            .await?;

        let mut baselines = BTreeMap::new();
        for &kind in pending {
            if let Some(baseline) = self
                .channel_baseline(ctx, prior.as_ref(), record, kind)
                .await?
            {
                baselines.insert(kind, baseline);
            }
        }
        Ok(baselines)
    }

    /// Baseline for one channel, in order of preference:
    ///
    /// - the baseline a retried record already stored for it
    /// - the snapshot of the subscriber's most recent earlier record, if that
    ///   record is resolved or delivered on this channel
    /// - that record's own baseline for the channel, when it failed or stalled
    ///   before delivering here, so its listings are still owed
    /// - the snapshot before the target
    async fn channel_baseline(
        &self,
        ctx: &RunContext<'_>,
        prior: Option<&NotificationRecord>,
        record: &NotificationRecord,
        kind: ChannelKind,
    ) -> Result<Option<Snapshot>> {
        if let Some(id) = record.baseline_for(kind) {
            if let Some(stored) = self.snapshots.get(id).await? {
                return Ok(Some(stored));
            }
            log::warn!("Stored baseline snapshot {} is gone, resolving again", id);
        }

        let Some(prior) = prior else {
            return Ok(ctx.default_baseline.clone());
        };

        let candidate = if prior.is_resolved() || prior.delivered_on(kind) {
            self.snapshots.get(prior.snapshot_id).await?
        } else if let Some(id) = prior.baseline_for(kind) {
            self.snapshots.get(id).await?
        } else {
            // Stalled before resolving a baseline: compare against what preceded it
            match self.snapshots.get(prior.snapshot_id).await? {
                Some(snapshot) => self.snapshots.previous(&snapshot.shelter, &snapshot).await?,
                None => None,
            }
        };

        if let Some(snapshot) = candidate {
            if snapshot.shelter == ctx.target.shelter {
                if let Some(settled) = self.settle(snapshot).await? {
                    return Ok(Some(settled));
                }
            }
        }
        Ok(ctx.default_baseline.clone())
    }

    /// Walk back past degraded snapshots when configured to.
    async fn settle(&self, mut snapshot: Snapshot) -> Result<Option<Snapshot>> {
        while self.config.skip_degraded_baselines && snapshot.is_degraded() {
            log::debug!("Snapshot {} is degraded, looking further back", snapshot.id);
            match self.snapshots.previous(&snapshot.shelter, &snapshot).await? {
                Some(previous) => snapshot = previous,
                None => return Ok(None),
            }
        }
        Ok(Some(snapshot))
    }
}

fn report(
    subscription: &Subscription,
    outcome: Outcome,
    delivered: Vec<ChannelKind>,
) -> SubscriptionReport {
    SubscriptionReport {
        subscription_id: subscription.id,
        outcome,
        delivered,
    }
}
