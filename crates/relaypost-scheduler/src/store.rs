//! Store contract: the atomic operations over queue state.
//!
//! Every implementation must keep two promises:
//! - `reserve_due` never hands the same item to two callers, including
//!   callers in other processes sharing the same backing store;
//! - `recover_stale_processing` only touches `processing` items whose
//!   `updated_at` is strictly before the cutoff.
//!
//! Nothing here deletes items.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaypost_core::config::{StoreBackend, StoreConfig};
use relaypost_core::error::Result;

use crate::item::{Enqueued, ItemFilter, NewQueueItem, QueueItem, QueueSummary, Reschedule};
use crate::memory::InMemoryStore;
use crate::persistence::SqliteStore;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Backend name for logs and status output.
    fn backend(&self) -> &'static str;

    /// Create an item. When `idempotency_key` matches an existing item, that
    /// item is returned with `duplicate = true` and nothing is written.
    async fn enqueue(&self, item: NewQueueItem) -> Result<Enqueued>;

    /// Atomically move up to `limit` `queued` items with `next_post_at <=
    /// due_by` to `processing`, stamping `updated_at = reserved_at`. Earliest
    /// due first. `reserved_at` is the wall clock the lease is measured on.
    async fn reserve_due(
        &self,
        due_by: DateTime<Utc>,
        reserved_at: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueItem>>;

    /// Atomically move `processing` items last updated before `stale_before`
    /// back to `queued`. Returns how many moved.
    async fn recover_stale_processing(&self, stale_before: DateTime<Utc>) -> Result<usize>;

    /// Terminal success: clears pending targets and spends one occurrence.
    async fn mark_sent(&self, id: &str, posted_at: DateTime<Utc>) -> Result<()>;

    /// Terminal failure for this attempt. `pending_targets = None` keeps the
    /// current pending list.
    async fn mark_failed(
        &self,
        id: &str,
        reason: &str,
        pending_targets: Option<Vec<String>>,
    ) -> Result<()>;

    /// Back to `queued` for the next occurrence, pending targets reset to
    /// the full target list.
    async fn reschedule_after_send(&self, id: &str, reschedule: Reschedule) -> Result<()>;

    /// Operator override: back to `queued` from any status, due at
    /// `next_post_at` or now.
    async fn requeue(&self, id: &str, next_post_at: Option<DateTime<Utc>>) -> Result<QueueItem>;

    async fn get(&self, id: &str) -> Result<Option<QueueItem>>;

    async fn list(&self, filter: ItemFilter) -> Result<Vec<QueueItem>>;

    async fn summary(&self) -> Result<QueueSummary>;
}

/// Open the store named by configuration. `path` is used as given; callers
/// expand `~` first.
pub fn open_store(config: &StoreConfig, path: &Path) -> Result<Arc<dyn QueueStore>> {
    let store: Arc<dyn QueueStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::Sqlite => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(SqliteStore::open(path)?)
        }
    };
    tracing::info!("Queue store: {}", store.backend());
    Ok(store)
}

/// Truncate to at most `max` characters, on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
