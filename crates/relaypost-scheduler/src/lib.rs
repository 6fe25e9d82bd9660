//! # RelayPost Scheduler
//!
//! Durable queue and dispatch scheduler for broadcast posts.
//!
//! ## Guarantees
//! - At most one cycle per dispatcher at a time (re-entrant calls are skipped)
//! - Reservation is exclusive, even across processes sharing one SQLite file
//! - Items abandoned mid-flight return to the queue once their lease expires
//! - Duplicate submissions with the same idempotency key collapse into one item
//!
//! ## Architecture
//! ```text
//! Intake ──enqueue──▶ QueueStore (memory | sqlite)
//!                         ▲
//! Scheduler (tokio interval) ──▶ DispatchPath (direct | queued worker)
//!                                   └── Dispatcher::run_due
//!                                         ├── recover stale processing
//!                                         ├── reserve due batch
//!                                         ├── render + send per target
//!                                         └── sent | rescheduled | failed
//! ```

pub mod classify;
pub mod dispatcher;
pub mod engine;
pub mod intake;
pub mod item;
pub mod memory;
pub mod path;
pub mod persistence;
pub mod report;
pub mod schedule;
pub mod status;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use classify::{KeywordClassifier, normalize_tags};
pub use dispatcher::{DispatchSettings, Dispatcher, RunOptions};
pub use engine::{SchedulerHandle, spawn_scheduler};
pub use intake::{Intake, Submission};
pub use item::{
    Enqueued, ItemFilter, ItemStatus, NewQueueItem, QueueItem, QueueSummary, Reschedule,
    ScheduleMode,
};
pub use memory::InMemoryStore;
pub use path::DispatchPath;
pub use persistence::SqliteStore;
pub use report::{DispatchFailure, DispatchReport, ItemOutcome, ItemResult, Trigger};
pub use status::{SchedulerStatus, StatusReport};
pub use store::{QueueStore, open_store};
