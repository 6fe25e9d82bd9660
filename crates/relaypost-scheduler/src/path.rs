//! How a cycle request reaches the dispatcher: inline on the caller's task,
//! or through a dedicated worker task. Picked once at startup.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::{Dispatcher, RunOptions};
use crate::report::DispatchReport;

const QUEUE_DEPTH: usize = 16;

/// One queued cycle request.
pub struct DispatchJob {
    options: RunOptions,
    reply: oneshot::Sender<DispatchReport>,
}

pub enum DispatchPath {
    Direct(Arc<Dispatcher>),
    Queued {
        dispatcher: Arc<Dispatcher>,
        jobs: mpsc::Sender<DispatchJob>,
        /// Set from submission until the cycle ends, so a second request
        /// waiting in the channel can never stack behind the first.
        busy: Arc<AtomicBool>,
    },
}

/// Clears the busy flag when the job it covers is done.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DispatchPath {
    /// `queued = true` asks for the worker. Without a tokio runtime to host
    /// it, this falls back to `Direct`.
    pub fn start(dispatcher: Arc<Dispatcher>, queued: bool) -> Self {
        if !queued {
            return DispatchPath::Direct(dispatcher);
        }
        match Handle::try_current() {
            Ok(handle) => {
                let (jobs, rx) = mpsc::channel(QUEUE_DEPTH);
                let busy = Arc::new(AtomicBool::new(false));
                handle.spawn(run_worker(dispatcher.clone(), rx, busy.clone()));
                tracing::info!("🧵 Queued dispatch worker started");
                DispatchPath::Queued {
                    dispatcher,
                    jobs,
                    busy,
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Queued dispatch unavailable ({e}), using direct dispatch");
                DispatchPath::Direct(dispatcher)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DispatchPath::Direct(_) => "direct",
            DispatchPath::Queued { .. } => "queued",
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        match self {
            DispatchPath::Direct(dispatcher) => dispatcher,
            DispatchPath::Queued { dispatcher, .. } => dispatcher,
        }
    }

    /// Run one cycle. Same report either way.
    pub async fn run(&self, options: RunOptions) -> DispatchReport {
        let (dispatcher, jobs, busy) = match self {
            DispatchPath::Direct(dispatcher) => return dispatcher.run_due(options).await,
            DispatchPath::Queued {
                dispatcher,
                jobs,
                busy,
            } => (dispatcher, jobs, busy),
        };

        if busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return dispatcher.skip_report(options);
        }

        let (reply, response) = oneshot::channel();
        if jobs.send(DispatchJob { options, reply }).await.is_err() {
            tracing::warn!("⚠️ Dispatch worker gone, running cycle directly");
            let _guard = BusyGuard(busy.clone());
            return dispatcher.run_due(options).await;
        }
        match response.await {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!("⚠️ Dispatch worker dropped the request, running cycle directly");
                let _guard = BusyGuard(busy.clone());
                dispatcher.run_due(options).await
            }
        }
    }
}

async fn run_worker(
    dispatcher: Arc<Dispatcher>,
    mut jobs: mpsc::Receiver<DispatchJob>,
    busy: Arc<AtomicBool>,
) {
    while let Some(job) = jobs.recv().await {
        let report = {
            let _guard = BusyGuard(busy.clone());
            dispatcher.run_due(job.options).await
        };
        // Caller may have given up waiting.
        let _ = job.reply.send(report);
    }
    tracing::debug!("dispatch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::KeywordClassifier;
    use crate::dispatcher::DispatchSettings;
    use crate::memory::InMemoryStore;
    use crate::store::QueueStore;
    use crate::test_support::due_item;
    use async_trait::async_trait;
    use chrono::Utc;
    use relaypost_channels::SimulatedSender;
    use relaypost_core::error::Result;
    use relaypost_core::traits::Sender;
    use relaypost_core::types::SendOutcome;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn dispatcher_with(store: Arc<dyn QueueStore>, sender: Arc<dyn Sender>) -> Arc<Dispatcher> {
        let mut settings = DispatchSettings::default();
        settings.default_targets = vec!["grp-a".into()];
        Arc::new(Dispatcher::new(
            store,
            sender,
            Arc::new(KeywordClassifier::new()),
            settings,
        ))
    }

    fn dispatcher(store: Arc<dyn QueueStore>) -> Arc<Dispatcher> {
        dispatcher_with(store, Arc::new(SimulatedSender::new()))
    }

    /// Succeeds after a pause, counting sends.
    #[derive(Default)]
    struct SlowSender {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Sender for SlowSender {
        fn name(&self) -> &str {
            "slow"
        }

        async fn send_text(&self, _destination: &str, _message: &str) -> Result<SendOutcome> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(SendOutcome::delivered())
        }
    }

    #[tokio::test]
    async fn test_second_request_skipped_on_both_paths() {
        for queued in [false, true] {
            let store: Arc<dyn QueueStore> = Arc::new(InMemoryStore::new());
            store.enqueue(due_item(Utc::now(), &[])).await.unwrap();
            let sender = Arc::new(SlowSender::default());
            let path = DispatchPath::start(dispatcher_with(store.clone(), sender.clone()), queued);

            let (first, second) = tokio::join!(
                path.run(RunOptions::manual()),
                path.run(RunOptions::scheduled())
            );
            assert!(!first.skipped, "queued={queued}");
            assert_eq!(first.sent, 1, "queued={queued}");
            assert!(second.skipped, "queued={queued}");
            assert_eq!(second.picked, 0);
            assert_eq!(second.reason.as_deref(), Some(crate::report::SKIP_IN_PROGRESS));
            assert_eq!(sender.sends.load(Ordering::SeqCst), 1);

            // The guard is released once the first cycle ends.
            let again = path.run(RunOptions::manual()).await;
            assert!(!again.skipped, "queued={queued}");
        }
    }

    #[test]
    fn test_queued_without_runtime_falls_back() {
        let path = DispatchPath::start(dispatcher(Arc::new(InMemoryStore::new())), true);
        assert_eq!(path.name(), "direct");
    }

    #[tokio::test]
    async fn test_direct_and_queued_agree() {
        for queued in [false, true] {
            let store: Arc<dyn QueueStore> = Arc::new(InMemoryStore::new());
            store.enqueue(due_item(Utc::now(), &[])).await.unwrap();
            let path = DispatchPath::start(dispatcher(store.clone()), queued);
            assert_eq!(path.name(), if queued { "queued" } else { "direct" });

            let report = path.run(RunOptions::manual()).await;
            assert_eq!((report.picked, report.sent), (1, 1));
            assert_eq!(store.summary().await.unwrap().sent, 1);
        }
    }

    #[tokio::test]
    async fn test_dead_worker_falls_back_to_direct() {
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryStore::new());
        store.enqueue(due_item(Utc::now(), &[])).await.unwrap();
        let (jobs, rx) = mpsc::channel(1);
        drop(rx);
        let path = DispatchPath::Queued {
            dispatcher: dispatcher(store.clone()),
            jobs,
            busy: Arc::new(AtomicBool::new(false)),
        };

        let report = path.run(RunOptions::manual()).await;
        assert_eq!(report.sent, 1);
    }
}
