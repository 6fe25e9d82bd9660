//! Periodic runner: fires a scheduled dispatch cycle on a fixed interval.
//! Uses tokio::interval so the task sleeps between ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatcher::RunOptions;
use crate::path::DispatchPath;

/// Controls a running scheduler loop.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Clear the periodic trigger. A cycle already in flight completes.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Wait for the loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!("⚠️ Scheduler task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the scheduler loop as a background tokio task. The first cycle
/// runs immediately.
pub fn spawn_scheduler(path: Arc<DispatchPath>) -> SchedulerHandle {
    let interval_secs = path.dispatcher().settings().interval_secs;
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        tracing::info!(
            "⏰ Scheduler started (every {}s, {} dispatch)",
            interval_secs,
            path.name()
        );
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = path.run(RunOptions::scheduled()).await;
                    if report.picked > 0 || report.recovered > 0 {
                        tracing::info!(
                            "🔔 Scheduled cycle: {} picked, {} sent, {} rescheduled, {} failed",
                            report.picked,
                            report.sent,
                            report.rescheduled,
                            report.failed
                        );
                    }
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("⏹️ Scheduler stopped");
    });

    SchedulerHandle { stop, task }
}
