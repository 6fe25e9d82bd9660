//! Read-only view of the scheduler and the queue.

use relaypost_core::error::Result;
use serde::Serialize;

use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::item::QueueSummary;
use crate::report::DispatchReport;

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub settings: DispatchSettings,
    pub running: bool,
    pub last_report: Option<DispatchReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub scheduler: SchedulerStatus,
    pub store: &'static str,
    pub queue: QueueSummary,
}

impl Dispatcher {
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            settings: self.settings().clone(),
            running: self.is_running(),
            last_report: self.last_report(),
        }
    }

    /// Scheduler status plus current queue counts.
    pub async fn status_report(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            scheduler: self.status(),
            store: self.store().backend(),
            queue: self.store().summary().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::KeywordClassifier;
    use crate::dispatcher::RunOptions;
    use crate::memory::InMemoryStore;
    use crate::store::QueueStore;
    use crate::test_support::due_item;
    use chrono::Utc;
    use relaypost_channels::SimulatedSender;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_before_and_after_a_cycle() {
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryStore::new());
        let mut settings = DispatchSettings::default();
        settings.default_targets = vec!["grp-a".into()];
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(SimulatedSender::new()),
            Arc::new(KeywordClassifier::new()),
            settings,
        );

        let status = dispatcher.status_report().await.unwrap();
        assert!(!status.scheduler.running);
        assert!(status.scheduler.last_report.is_none());
        assert_eq!(status.store, "memory");
        assert_eq!(status.queue.total, 0);

        store.enqueue(due_item(Utc::now(), &[])).await.unwrap();
        dispatcher.run_due(RunOptions::manual()).await;

        let status = dispatcher.status_report().await.unwrap();
        assert_eq!(status.queue.sent, 1);
        let last = status.scheduler.last_report.unwrap();
        assert_eq!(last.sent, 1);

        let json = serde_json::to_value(dispatcher.status()).unwrap();
        assert_eq!(json["settings"]["batch_size"], 10);
        assert_eq!(json["running"], false);
    }
}
