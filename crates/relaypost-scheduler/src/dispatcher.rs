//! Dispatch scheduler: one cycle recovers stale work, reserves a batch of due
//! items, sends each to its targets and records where it ended up.
//!
//! Nothing that goes wrong inside a cycle is returned as an error. Failures
//! land on the item (`last_error`) and in the [`DispatchReport`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use relaypost_channels::SimulatedSender;
use relaypost_core::config::SchedulerConfig;
use relaypost_core::error::Result;
use relaypost_core::traits::{Classifier, Sender};
use relaypost_core::types::RenderRequest;
use serde::Serialize;

use crate::intake::normalize_targets;
use crate::item::QueueItem;
use crate::report::{
    DispatchFailure, DispatchReport, ItemOutcome, ItemResult, SKIP_IN_PROGRESS, Trigger,
};
use crate::schedule::{AfterSuccess, after_success};
use crate::store::{QueueStore, truncate_chars};

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 100;
pub const MIN_INTERVAL_SECS: u64 = 10;
pub const MIN_LEASE_SECS: u64 = 30;
/// Longest transport error kept on an item.
pub const MAX_ERROR_CHARS: usize = 300;

/// Runtime settings derived from [`SchedulerConfig`] with floors and
/// ceilings applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_size: usize,
    pub lease_secs: u64,
    pub default_targets: Vec<String>,
    pub dry_run: bool,
    pub queued_dispatch: bool,
}

impl DispatchSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval_secs: config.interval_secs.max(MIN_INTERVAL_SECS),
            batch_size: config.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
            lease_secs: config.lease_secs.max(MIN_LEASE_SECS),
            default_targets: normalize_targets(&config.default_targets),
            dry_run: config.dry_run,
            queued_dispatch: config.queued_dispatch,
        }
    }

    pub fn lease(&self) -> Duration {
        Duration::seconds(self.lease_secs as i64)
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// Per-cycle options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Evaluation instant; the wall clock when `None`.
    pub now: Option<DateTime<Utc>>,
    /// `None` = manual cycles are live, scheduled cycles follow config.
    pub dry_run: Option<bool>,
    pub trigger: Trigger,
}

impl RunOptions {
    pub fn manual() -> Self {
        Self {
            now: None,
            dry_run: None,
            trigger: Trigger::Manual,
        }
    }

    pub fn scheduled() -> Self {
        Self {
            trigger: Trigger::Scheduled,
            ..Self::manual()
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::manual()
    }
}

/// Clears the in-progress flag when a cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Dispatcher {
    store: Arc<dyn QueueStore>,
    sender: Arc<dyn Sender>,
    simulator: Arc<dyn Sender>,
    classifier: Arc<dyn Classifier>,
    settings: DispatchSettings,
    running: AtomicBool,
    last_report: RwLock<Option<DispatchReport>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn QueueStore>,
        sender: Arc<dyn Sender>,
        classifier: Arc<dyn Classifier>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            sender,
            simulator: Arc::new(SimulatedSender::new()),
            classifier,
            settings,
            running: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Most recent completed (not skipped) cycle.
    pub fn last_report(&self) -> Option<DispatchReport> {
        match self.last_report.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn resolve_dry_run(&self, options: &RunOptions) -> bool {
        options.dry_run.unwrap_or(match options.trigger {
            Trigger::Manual => false,
            Trigger::Scheduled => self.settings.dry_run,
        })
    }

    /// The `dispatch_in_progress` answer for a request that lost the race.
    pub fn skip_report(&self, options: RunOptions) -> DispatchReport {
        tracing::info!(trigger = ?options.trigger, "⏭️ Dispatch skipped: cycle already running");
        DispatchReport::skipped(
            options.trigger,
            self.resolve_dry_run(&options),
            Utc::now(),
            SKIP_IN_PROGRESS,
        )
    }

    /// Run one dispatch cycle.
    pub async fn run_due(&self, options: RunOptions) -> DispatchReport {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.skip_report(options);
        }
        let started_at = Utc::now();
        let now = options.now.unwrap_or(started_at);
        let dry_run = self.resolve_dry_run(&options);
        let _guard = CycleGuard(&self.running);

        let report = self.cycle(options.trigger, now, dry_run, started_at).await;
        match self.last_report.write() {
            Ok(mut guard) => *guard = Some(report.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(report.clone()),
        }
        report
    }

    async fn cycle(
        &self,
        trigger: Trigger,
        now: DateTime<Utc>,
        dry_run: bool,
        started_at: DateTime<Utc>,
    ) -> DispatchReport {
        let mut report = DispatchReport::begin(trigger, dry_run, started_at);

        // Leases run on the wall clock even when `now` is overridden.
        match self.store.recover_stale_processing(started_at - self.settings.lease()).await {
            Ok(0) => {}
            Ok(n) => {
                tracing::warn!(recovered = n, "♻️ Stale processing items returned to queue");
                report.recovered = n;
            }
            Err(e) => tracing::warn!("⚠️ Stale recovery failed: {e}"),
        }

        let items = match self
            .store
            .reserve_due(now, Utc::now(), self.settings.batch_size)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("❌ Reservation failed: {e}");
                report.reason = Some(format!("reservation failed: {e}"));
                return report.finish(Utc::now());
            }
        };
        report.picked = items.len();

        let sender = if dry_run { &self.simulator } else { &self.sender };
        for item in &items {
            let result = self.dispatch_item(item, sender.as_ref(), now).await;
            tracing::info!(
                id = %result.id,
                status = %result.outcome.status(),
                targets = result.targets.len(),
                "{}",
                result.summary
            );
            report.record(result);
        }

        let report = report.finish(Utc::now());
        tracing::info!(
            trigger = ?trigger,
            dry_run,
            picked = report.picked,
            sent = report.sent,
            rescheduled = report.rescheduled,
            failed = report.failed,
            "📤 Dispatch cycle complete"
        );
        report
    }

    async fn dispatch_item(
        &self,
        item: &QueueItem,
        sender: &dyn Sender,
        now: DateTime<Utc>,
    ) -> ItemResult {
        let targets = effective_targets(item, &self.settings.default_targets);
        if targets.is_empty() {
            return self.record_failure(item, targets, DispatchFailure::NoTargets, None).await;
        }

        let message = self.classifier.render_message(&RenderRequest {
            kind: item.kind,
            priority: item.priority,
            content: &item.content,
            attribution: &item.attribution,
            tags: &item.tags,
        });

        let mut failed_targets = Vec::new();
        let mut errors = Vec::new();
        for target in &targets {
            match sender.send_text(target, &message).await {
                Ok(outcome) if outcome.ok => {
                    tracing::debug!(id = %item.id, destination = %target, via = sender.name(), "sent");
                }
                Ok(outcome) => {
                    let error = outcome.error.unwrap_or_else(|| "rejected".into());
                    tracing::warn!(id = %item.id, destination = %target, "⚠️ Send rejected: {error}");
                    errors.push(format!("{target}: {error}"));
                    failed_targets.push(target.clone());
                }
                Err(e) => {
                    let reason = truncate_chars(&e.to_string(), MAX_ERROR_CHARS);
                    tracing::warn!(id = %item.id, destination = %target, "⚠️ Transport error: {reason}");
                    let pending = targets.clone();
                    return self
                        .record_failure(item, pending, DispatchFailure::Transport(reason), None)
                        .await;
                }
            }
        }

        if let Some(failure) = DispatchFailure::from_failed(targets.len(), failed_targets) {
            let detail = truncate_chars(&errors.join("; "), MAX_ERROR_CHARS);
            return self.record_failure(item, targets, failure, Some(detail)).await;
        }

        let (outcome, write) = match after_success(item, now) {
            AfterSuccess::Repeat(reschedule) => (
                ItemOutcome::Rescheduled,
                with_retry(|| self.store.reschedule_after_send(&item.id, reschedule)).await,
            ),
            AfterSuccess::Done => (
                ItemOutcome::Sent,
                with_retry(|| self.store.mark_sent(&item.id, now)).await,
            ),
        };
        match write {
            Ok(()) => ItemResult {
                id: item.id.clone(),
                outcome,
                summary: match outcome {
                    ItemOutcome::Rescheduled => "sent, rescheduled".into(),
                    _ => "sent".into(),
                },
                targets,
                failed_targets: vec![],
                error: None,
            },
            Err(e) => unrecorded(item, targets, vec![], e),
        }
    }

    /// Write a failure to the store and describe it for the report.
    async fn record_failure(
        &self,
        item: &QueueItem,
        targets: Vec<String>,
        failure: DispatchFailure,
        detail: Option<String>,
    ) -> ItemResult {
        let reason = failure.to_string();
        let failed_targets = failure.failed_targets().map(<[String]>::to_vec);
        let pending = match &failure {
            DispatchFailure::NoTargets => None,
            DispatchFailure::Transport(_) => Some(targets.clone()),
            _ => failed_targets.clone(),
        };

        let write = with_retry(|| self.store.mark_failed(&item.id, &reason, pending.clone())).await;
        let failed_targets = failed_targets.unwrap_or_default();
        match write {
            Ok(()) => ItemResult {
                id: item.id.clone(),
                outcome: ItemOutcome::Failed,
                targets,
                failed_targets,
                error: match &failure {
                    DispatchFailure::Transport(e) => Some(e.clone()),
                    _ => detail,
                },
                summary: reason,
            },
            Err(e) => unrecorded(item, targets, failed_targets, e),
        }
    }
}

/// Pending targets, else the item's targets, else the configured defaults.
pub fn effective_targets(item: &QueueItem, defaults: &[String]) -> Vec<String> {
    if !item.pending_targets.is_empty() {
        item.pending_targets.clone()
    } else if !item.targets.is_empty() {
        item.targets.clone()
    } else {
        defaults.to_vec()
    }
}

/// One retry for outcome writes.
async fn with_retry<F, Fut>(op: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match op().await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!("⚠️ Outcome write failed, retrying: {e}");
            op().await
        }
    }
}

/// The item stays `processing` until the lease runs out and recovery
/// returns it to the queue.
fn unrecorded(
    item: &QueueItem,
    targets: Vec<String>,
    failed_targets: Vec<String>,
    error: relaypost_core::RelayError,
) -> ItemResult {
    tracing::error!(id = %item.id, "❌ Outcome not recorded: {error}");
    ItemResult {
        id: item.id.clone(),
        outcome: ItemOutcome::Failed,
        targets,
        failed_targets,
        summary: format!("outcome not recorded: {error}"),
        error: Some(truncate_chars(&error.to_string(), MAX_ERROR_CHARS)),
    }
}
