//! SQLite-backed queue store. Survives restarts and is safe to share between
//! processes pointing at the same database file.
//!
//! Reservation and stale recovery are each a single conditional `UPDATE`, so
//! SQLite's write lock is what keeps two dispatchers from claiming the same row.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use relaypost_core::error::{RelayError, Result};
use relaypost_core::types::Attribution;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::item::{
    Enqueued, ItemFilter, ItemStatus, NewQueueItem, QueueItem, QueueSummary, Reschedule,
};
use crate::store::QueueStore;

const COLUMNS: &str = "id, kind, priority, content, posted_by, contact, tags, targets, \
     pending_targets, status, schedule_mode, next_post_at, remaining_posts, source, source_ref, \
     idempotency_key, attempts, last_error, last_posted_at, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the queue database. `":memory:"` gives a private
    /// in-process database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| store_err("open", e))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| store_err("busy_timeout", e))?;
        // In-memory databases answer "memory" here; that is fine.
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| store_err("journal_mode", e))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS queue_items (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                priority TEXT NOT NULL,
                content TEXT NOT NULL,
                posted_by TEXT,
                contact TEXT,
                tags TEXT NOT NULL DEFAULT '[]',            -- JSON array
                targets TEXT NOT NULL DEFAULT '[]',         -- JSON array
                pending_targets TEXT NOT NULL DEFAULT '[]', -- JSON array
                status TEXT NOT NULL DEFAULT 'queued',      -- queued, processing, sent, failed
                schedule_mode TEXT NOT NULL DEFAULT 'once', -- once, daily, weekly
                next_post_at TEXT NOT NULL,
                remaining_posts INTEGER,                    -- NULL = unbounded
                source TEXT NOT NULL,
                source_ref TEXT,
                idempotency_key TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_posted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_items_idempotency
                ON queue_items(idempotency_key) WHERE idempotency_key IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_queue_items_due
                ON queue_items(status, next_post_at);
         ",
            )
            .map_err(|e| store_err("migration", e))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RelayError::Store(format!("sqlite connection lock poisoned: {e}")))
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<QueueItem>> {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM queue_items WHERE id = ?1"),
            params![id],
            row_to_item,
        )
        .optional()
        .map_err(|e| store_err("get", e))
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    fn backend(&self) -> &'static str { "sqlite" }

    async fn enqueue(&self, item: NewQueueItem) -> Result<Enqueued> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| store_err("enqueue", e))?;

        if let Some(key) = &item.idempotency_key {
            let existing = tx
                .query_row(
                    &format!("SELECT {COLUMNS} FROM queue_items WHERE idempotency_key = ?1"),
                    params![key],
                    row_to_item,
                )
                .optional()
                .map_err(|e| store_err("enqueue lookup", e))?;
            if let Some(existing) = existing {
                return Ok(Enqueued {
                    item: existing,
                    duplicate: true,
                });
            }
        }

        let item = item.into_item(Utc::now());
        tx.execute(
            &format!(
                "INSERT INTO queue_items ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19, ?20, ?21)"
            ),
            params![
                item.id,
                item.kind.as_str(),
                item.priority.as_str(),
                item.content,
                item.attribution.posted_by,
                item.attribution.contact,
                to_json(&item.tags)?,
                to_json(&item.targets)?,
                to_json(&item.pending_targets)?,
                item.status.as_str(),
                item.schedule_mode.as_str(),
                ts(&item.next_post_at),
                item.remaining_posts,
                item.source,
                item.source_ref,
                item.idempotency_key,
                item.attempts,
                item.last_error,
                item.last_posted_at.as_ref().map(ts),
                ts(&item.created_at),
                ts(&item.updated_at),
            ],
        )
        .map_err(|e| store_err("insert", e))?;
        tx.commit().map_err(|e| store_err("enqueue commit", e))?;

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
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "UPDATE queue_items SET status = 'processing', updated_at = ?3
                 WHERE id IN (
                     SELECT id FROM queue_items
                     WHERE status = 'queued' AND next_post_at <= ?1
                     ORDER BY next_post_at, created_at
                     LIMIT ?2
                 ) AND status = 'queued'
                 RETURNING {COLUMNS}"
            ))
            .map_err(|e| store_err("reserve", e))?;
        let mut items = stmt
            .query_map(
                params![ts(&due_by), limit as i64, ts(&reserved_at)],
                row_to_item,
            )
            .map_err(|e| store_err("reserve", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| store_err("reserve", e))?;
        // RETURNING order is unspecified.
        items.sort_by_key(|i| (i.next_post_at, i.created_at));
        Ok(items)
    }

    async fn recover_stale_processing(&self, stale_before: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE queue_items SET status = 'queued', updated_at = ?2
             WHERE status = 'processing' AND updated_at < ?1",
            params![ts(&stale_before), ts(&Utc::now())],
        )
        .map_err(|e| store_err("recover", e))
    }

    async fn mark_sent(&self, id: &str, posted_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE queue_items SET status = 'sent', pending_targets = '[]',
                     remaining_posts = CASE
                         WHEN remaining_posts IS NULL THEN NULL
                         WHEN remaining_posts > 0 THEN remaining_posts - 1
                         ELSE 0 END,
                     last_posted_at = ?2, last_error = NULL,
                     attempts = attempts + 1, updated_at = ?3
                 WHERE id = ?1",
                params![id, ts(&posted_at), ts(&Utc::now())],
            )
            .map_err(|e| store_err("mark_sent", e))?;
        expect_one(changed, id)
    }

    async fn mark_failed(
        &self,
        id: &str,
        reason: &str,
        pending_targets: Option<Vec<String>>,
    ) -> Result<()> {
        let pending = pending_targets.as_deref().map(to_json).transpose()?;
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE queue_items SET status = 'failed',
                     pending_targets = COALESCE(?3, pending_targets),
                     last_error = ?2, attempts = attempts + 1, updated_at = ?4
                 WHERE id = ?1",
                params![id, reason, pending, ts(&Utc::now())],
            )
            .map_err(|e| store_err("mark_failed", e))?;
        expect_one(changed, id)
    }

    async fn reschedule_after_send(&self, id: &str, reschedule: Reschedule) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE queue_items SET status = 'queued', next_post_at = ?2,
                     remaining_posts = ?3, last_posted_at = ?4,
                     pending_targets = targets, last_error = NULL,
                     attempts = attempts + 1, updated_at = ?5
                 WHERE id = ?1",
                params![
                    id,
                    ts(&reschedule.next_post_at),
                    reschedule.remaining_posts,
                    ts(&reschedule.posted_at),
                    ts(&Utc::now()),
                ],
            )
            .map_err(|e| store_err("reschedule", e))?;
        expect_one(changed, id)
    }

    async fn requeue(&self, id: &str, next_post_at: Option<DateTime<Utc>>) -> Result<QueueItem> {
        let conn = self.lock()?;
        let now = Utc::now();
        let changed = conn
            .execute(
                "UPDATE queue_items SET status = 'queued', next_post_at = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id, ts(&next_post_at.unwrap_or(now)), ts(&now)],
            )
            .map_err(|e| store_err("requeue", e))?;
        expect_one(changed, id)?;
        Self::fetch(&conn, id)?.ok_or_else(|| RelayError::NotFound(id.to_string()))
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        let conn = self.lock()?;
        Self::fetch(&conn, id)
    }

    async fn list(&self, filter: ItemFilter) -> Result<Vec<QueueItem>> {
        let conn = self.lock()?;
        let limit = filter.effective_limit() as i64;
        let rows = match filter.status {
            Some(status) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {COLUMNS} FROM queue_items WHERE status = ?1
                         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                    ))
                    .map_err(|e| store_err("list", e))?;
                stmt.query_map(params![status.as_str(), limit], row_to_item)
                    .map_err(|e| store_err("list", e))?
                    .collect::<rusqlite::Result<Vec<_>>>()
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {COLUMNS} FROM queue_items
                         ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                    ))
                    .map_err(|e| store_err("list", e))?;
                stmt.query_map(params![limit], row_to_item)
                    .map_err(|e| store_err("list", e))?
                    .collect::<rusqlite::Result<Vec<_>>>()
            }
        };
        rows.map_err(|e| store_err("list", e))
    }

    async fn summary(&self) -> Result<QueueSummary> {
        let conn = self.lock()?;
        let mut summary = QueueSummary::default();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM queue_items GROUP BY status")
            .map_err(|e| store_err("summary", e))?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| store_err("summary", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| store_err("summary", e))?;
        for (status, n) in counts {
            let status = ItemStatus::from_str(&status).map_err(RelayError::Store)?;
            summary.count(status, n.max(0) as usize);
        }

        let next_due: Option<String> = conn
            .query_row(
                "SELECT MIN(next_post_at) FROM queue_items WHERE status = 'queued'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| store_err("summary", e))?;
        summary.next_due_at = next_due.map(|s| parse_ts_str(&s)).transpose()?;
        Ok(summary)
    }
}

fn store_err(op: &str, e: rusqlite::Error) -> RelayError {
    RelayError::Store(format!("{op}: {e}"))
}

fn expect_one(changed: usize, id: &str) -> Result<()> {
    if changed == 0 {
        Err(RelayError::NotFound(id.to_string()))
    } else {
        Ok(())
    }
}

/// Fixed-width UTC so text comparison in SQL matches time order.
fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts_str(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| RelayError::Store(format!("bad timestamp '{s}': {e}")))
}

fn to_json(list: &[String]) -> Result<String> {
    Ok(serde_json::to_string(list)?)
}

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn col_parse<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

fn col_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e.to_string()))
}

fn col_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => col_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn col_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e.to_string()))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let schedule_mode: String = row.get(10)?;
    Ok(QueueItem {
        id: row.get(0)?,
        kind: col_parse(row, 1)?,
        priority: col_parse(row, 2)?,
        content: row.get(3)?,
        attribution: Attribution {
            posted_by: row.get(4)?,
            contact: row.get(5)?,
        },
        tags: col_list(row, 6)?,
        targets: col_list(row, 7)?,
        pending_targets: col_list(row, 8)?,
        status: col_parse(row, 9)?,
        schedule_mode: crate::item::ScheduleMode::parse_lenient(Some(&schedule_mode)),
        next_post_at: col_ts(row, 11)?,
        remaining_posts: row.get(12)?,
        source: row.get(13)?,
        source_ref: row.get(14)?,
        idempotency_key: row.get(15)?,
        attempts: row.get(16)?,
        last_error: row.get(17)?,
        last_posted_at: col_opt_ts(row, 18)?,
        created_at: col_ts(row, 19)?,
        updated_at: col_ts(row, 20)?,
    })
}
