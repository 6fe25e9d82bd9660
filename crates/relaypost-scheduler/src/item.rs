//! Queue item definitions: the core data model for scheduled broadcast posts.

use chrono::{DateTime, Utc};
use relaypost_core::types::{Attribution, ItemKind, Priority};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A broadcast post waiting for, or done with, dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub kind: ItemKind,
    pub priority: Priority,
    pub content: String,
    #[serde(default)]
    pub attribution: Attribution,
    /// Normalized lowercase tokens.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Every destination this post goes to. Empty means "use the defaults".
    #[serde(default)]
    pub targets: Vec<String>,
    /// Destinations not yet confirmed for the current attempt.
    #[serde(default)]
    pub pending_targets: Vec<String>,
    pub status: ItemStatus,
    pub schedule_mode: ScheduleMode,
    pub next_post_at: DateTime<Utc>,
    /// `None` = unbounded.
    pub remaining_posts: Option<u32>,
    pub source: String,
    pub source_ref: Option<String>,
    pub idempotency_key: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Queued and not in the future.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ItemStatus::Queued && self.next_post_at <= now
    }

    pub fn is_recurring(&self) -> bool {
        self.schedule_mode != ScheduleMode::Once
    }
}

/// Item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Processing,
    Sent,
    Failed,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 4] = [
        ItemStatus::Queued,
        ItemStatus::Processing,
        ItemStatus::Sent,
        ItemStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Processing => "processing",
            ItemStatus::Sent => "sent",
            ItemStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(ItemStatus::Queued),
            "processing" => Ok(ItemStatus::Processing),
            "sent" => Ok(ItemStatus::Sent),
            "failed" => Ok(ItemStatus::Failed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// How often a post repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    #[default]
    Once,
    Daily,
    Weekly,
}

impl ScheduleMode {
    /// Unrecognized or missing values mean `Once`.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("daily") => ScheduleMode::Daily,
            Some("weekly") => ScheduleMode::Weekly,
            _ => ScheduleMode::Once,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleMode::Once => "once",
            ScheduleMode::Daily => "daily",
            ScheduleMode::Weekly => "weekly",
        }
    }
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated item ready to be written by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueItem {
    pub kind: ItemKind,
    pub priority: Priority,
    pub content: String,
    pub attribution: Attribution,
    pub tags: Vec<String>,
    pub targets: Vec<String>,
    pub schedule_mode: ScheduleMode,
    pub next_post_at: DateTime<Utc>,
    pub remaining_posts: Option<u32>,
    pub source: String,
    pub source_ref: Option<String>,
    pub idempotency_key: Option<String>,
}

impl NewQueueItem {
    /// Materialize with a fresh id; pending targets start as a copy of targets.
    pub fn into_item(self, now: DateTime<Utc>) -> QueueItem {
        QueueItem {
            id: uuid::Uuid::new_v4().to_string(),
            kind: self.kind,
            priority: self.priority,
            content: self.content,
            attribution: self.attribution,
            tags: self.tags,
            pending_targets: self.targets.clone(),
            targets: self.targets,
            status: ItemStatus::Queued,
            schedule_mode: self.schedule_mode,
            next_post_at: self.next_post_at,
            remaining_posts: self.remaining_posts,
            source: self.source,
            source_ref: self.source_ref,
            idempotency_key: self.idempotency_key,
            attempts: 0,
            last_error: None,
            last_posted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of an enqueue: the stored item, and whether it already existed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enqueued {
    pub item: QueueItem,
    pub duplicate: bool,
}

/// Arguments for putting a recurring item back in the queue after a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reschedule {
    pub next_post_at: DateTime<Utc>,
    pub remaining_posts: Option<u32>,
    pub posted_at: DateTime<Utc>,
}

/// Listing filter. Newest items first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ItemFilter {
    #[serde(default)]
    pub status: Option<ItemStatus>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize { 50 }

impl ItemFilter {
    pub const MAX_LIMIT: usize = 500;

    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, Self::MAX_LIMIT)
    }
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: default_list_limit(),
        }
    }
}

/// Counts by status plus the earliest due time among queued items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub queued: usize,
    pub processing: usize,
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    pub next_due_at: Option<DateTime<Utc>>,
}

impl QueueSummary {
    pub fn count(&mut self, status: ItemStatus, n: usize) {
        match status {
            ItemStatus::Queued => self.queued += n,
            ItemStatus::Processing => self.processing += n,
            ItemStatus::Sent => self.sent += n,
            ItemStatus::Failed => self.failed += n,
        }
        self.total += n;
    }
}
