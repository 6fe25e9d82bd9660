//! Intake: validate a submission, fill in what the caller left out, enqueue.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use relaypost_core::error::{RelayError, Result};
use relaypost_core::traits::Classifier;
use relaypost_core::types::{Attribution, ItemKind, Priority};
use serde::{Deserialize, Serialize};

use crate::classify::normalize_tags;
use crate::item::{Enqueued, NewQueueItem, ScheduleMode};
use crate::schedule::occurrence_budget;
use crate::store::QueueStore;

/// Source recorded when the caller does not name one.
pub const DEFAULT_SOURCE: &str = "api";

/// A post as submitted by a caller. Only `content` is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub schedule_mode: Option<String>,
    /// Occurrences for recurring posts. Kept as a float so non-finite and
    /// fractional input can be clamped instead of rejected.
    #[serde(default)]
    pub repeat_count: Option<f64>,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_ref: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub posted_by: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub struct Intake {
    store: Arc<dyn QueueStore>,
    classifier: Arc<dyn Classifier>,
}

impl Intake {
    pub fn new(store: Arc<dyn QueueStore>, classifier: Arc<dyn Classifier>) -> Self {
        Self { store, classifier }
    }

    /// Validate and enqueue. Exactly one store call; duplicates are the
    /// store's business.
    pub async fn submit(&self, submission: Submission, now: DateTime<Utc>) -> Result<Enqueued> {
        let item = self.prepare(submission, now)?;
        let enqueued = self.store.enqueue(item).await?;
        if enqueued.duplicate {
            tracing::info!(
                id = %enqueued.item.id,
                key = enqueued.item.idempotency_key.as_deref().unwrap_or(""),
                "duplicate submission collapsed"
            );
        } else {
            tracing::info!(
                id = %enqueued.item.id,
                kind = %enqueued.item.kind,
                mode = %enqueued.item.schedule_mode,
                due = %enqueued.item.next_post_at,
                "📥 queued"
            );
        }
        Ok(enqueued)
    }

    /// Everything `submit` does short of writing.
    pub fn prepare(&self, submission: Submission, now: DateTime<Utc>) -> Result<NewQueueItem> {
        let content = submission.content.trim();
        if content.is_empty() {
            return Err(RelayError::Validation("content must not be empty".into()));
        }

        let kind = match non_empty(submission.kind) {
            Some(kind) => kind.parse::<ItemKind>().map_err(RelayError::Validation)?,
            None => self.classifier.classify_kind(content),
        };
        let priority = match non_empty(submission.priority) {
            Some(priority) => priority.parse::<Priority>().map_err(RelayError::Validation)?,
            None => self.classifier.classify_priority(content),
        };

        let mut tags = submission.tags;
        tags.extend(self.classifier.classify_tags(content));
        let tags = normalize_tags(tags);

        let schedule_mode = ScheduleMode::parse_lenient(submission.schedule_mode.as_deref());
        let remaining_posts = occurrence_budget(schedule_mode, submission.repeat_count);
        let next_post_at = submission.start_at.map_or(now, |at| at.max(now));

        let source = non_empty(submission.source).unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let source_ref = non_empty(submission.source_ref);
        let idempotency_key = resolve_idempotency_key(
            submission.idempotency_key.as_deref(),
            &source,
            source_ref.as_deref(),
        );

        Ok(NewQueueItem {
            kind,
            priority,
            content: content.to_string(),
            attribution: Attribution {
                posted_by: non_empty(submission.posted_by),
                contact: non_empty(submission.contact),
            },
            tags,
            targets: normalize_targets(submission.targets),
            schedule_mode,
            next_post_at,
            remaining_posts: Some(remaining_posts),
            source,
            source_ref,
            idempotency_key,
        })
    }
}

/// Explicit key wins, then `source:source_ref`, else none.
pub fn resolve_idempotency_key(
    explicit: Option<&str>,
    source: &str,
    source_ref: Option<&str>,
) -> Option<String> {
    let explicit = explicit.map(str::trim).filter(|k| !k.is_empty());
    if let Some(key) = explicit {
        return Some(key.to_string());
    }
    source_ref.map(|r| format!("{source}:{r}"))
}

/// Trim, drop empties, dedupe keeping first-seen order.
pub fn normalize_targets<I, S>(targets: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
