//! In-memory queue store for single-process deployments and tests.
//!
//! All state sits behind one mutex, so reserve, recover and every write are
//! serialized against each other.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relaypost_core::error::{RelayError, Result};

use crate::item::{
    Enqueued, ItemFilter, ItemStatus, NewQueueItem, QueueItem, QueueSummary, Reschedule,
};
use crate::store::QueueStore;

#[derive(Default)]
struct State {
    /// Insertion order.
    items: Vec<QueueItem>,
    /// idempotency key → item id
    keys: HashMap<String, String>,
}

impl State {
    fn find_mut(&mut self, id: &str) -> Result<&mut QueueItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| RelayError::NotFound(id.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| RelayError::Store(format!("memory store lock poisoned: {e}")))
    }
}

#[async_trait]
impl QueueStore for InMemoryStore {
    fn backend(&self) -> &'static str { "memory" }

    async fn enqueue(&self, item: NewQueueItem) -> Result<Enqueued> {
        let mut state = self.lock()?;
        let existing_id = item
            .idempotency_key
            .as_ref()
            .and_then(|key| state.keys.get(key))
            .cloned();
        if let Some(existing_id) = existing_id {
            let existing = state
                .items
                .iter()
                .find(|i| i.id == existing_id)
                .cloned()
                .ok_or_else(|| {
                    RelayError::Store(format!("dangling idempotency key for {existing_id}"))
                })?;
            return Ok(Enqueued {
                item: existing,
                duplicate: true,
            });
        }

        let item = item.into_item(Utc::now());
        if let Some(key) = &item.idempotency_key {
            state.keys.insert(key.clone(), item.id.clone());
        }
        state.items.push(item.clone());
        Ok(Enqueued {
            item,
            duplicate: false,
        })
    }

    async fn reserve_due(
        &self,
        due_by: DateTime<Utc>,
        reserved_at: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueItem>> {
        let mut state = self.lock()?;
        let mut due: Vec<usize> = state
            .items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_due(due_by))
            .map(|(idx, _)| idx)
            .collect();
        due.sort_by_key(|&idx| (state.items[idx].next_post_at, state.items[idx].created_at));
        due.truncate(limit);

        let mut reserved = Vec::with_capacity(due.len());
        for idx in due {
            let item = &mut state.items[idx];
            item.status = ItemStatus::Processing;
            item.updated_at = reserved_at;
            reserved.push(item.clone());
        }
        Ok(reserved)
    }

    async fn recover_stale_processing(&self, stale_before: DateTime<Utc>) -> Result<usize> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut recovered = 0;
        for item in state.items.iter_mut() {
            if item.status == ItemStatus::Processing && item.updated_at < stale_before {
                item.status = ItemStatus::Queued;
                item.updated_at = now;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn mark_sent(&self, id: &str, posted_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        let item = state.find_mut(id)?;
        item.status = ItemStatus::Sent;
        item.pending_targets.clear();
        item.remaining_posts = item.remaining_posts.map(|r| r.saturating_sub(1));
        item.last_posted_at = Some(posted_at);
        item.last_error = None;
        item.attempts += 1;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &str,
        reason: &str,
        pending_targets: Option<Vec<String>>,
    ) -> Result<()> {
        let mut state = self.lock()?;
        let item = state.find_mut(id)?;
        item.status = ItemStatus::Failed;
        if let Some(pending) = pending_targets {
            item.pending_targets = pending;
        }
        item.last_error = Some(reason.to_string());
        item.attempts += 1;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn reschedule_after_send(&self, id: &str, reschedule: Reschedule) -> Result<()> {
        let mut state = self.lock()?;
        let item = state.find_mut(id)?;
        item.status = ItemStatus::Queued;
        item.next_post_at = reschedule.next_post_at;
        item.remaining_posts = reschedule.remaining_posts;
        item.last_posted_at = Some(reschedule.posted_at);
        item.pending_targets = item.targets.clone();
        item.last_error = None;
        item.attempts += 1;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn requeue(&self, id: &str, next_post_at: Option<DateTime<Utc>>) -> Result<QueueItem> {
        let mut state = self.lock()?;
        let item = state.find_mut(id)?;
        let now = Utc::now();
        item.status = ItemStatus::Queued;
        item.next_post_at = next_post_at.unwrap_or(now);
        item.updated_at = now;
        Ok(item.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        let state = self.lock()?;
        Ok(state.items.iter().find(|i| i.id == id).cloned())
    }

    async fn list(&self, filter: ItemFilter) -> Result<Vec<QueueItem>> {
        let state = self.lock()?;
        let mut items: Vec<QueueItem> = state
            .items
            .iter()
            .filter(|i| filter.status.is_none_or(|s| i.status == s))
            .cloned()
            .collect();
        // Newest first; insertion order breaks ties.
        items.reverse();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(filter.effective_limit());
        Ok(items)
    }

    async fn summary(&self) -> Result<QueueSummary> {
        let state = self.lock()?;
        let mut summary = QueueSummary::default();
        for item in &state.items {
            summary.count(item.status, 1);
            if item.status == ItemStatus::Queued {
                summary.next_due_at = Some(match summary.next_due_at {
                    Some(current) => current.min(item.next_post_at),
                    None => item.next_post_at,
                });
            }
        }
        Ok(summary)
    }
}
