//! Shared fixtures and the store conformance suite run against every backend.

use chrono::{DateTime, Duration, TimeZone, Utc};
use relaypost_core::types::{Attribution, ItemKind, Priority};

use crate::item::{NewQueueItem, ScheduleMode};

/// A queued one-shot listing due at `due`.
pub fn due_item(due: DateTime<Utc>, targets: &[&str]) -> NewQueueItem {
    NewQueueItem {
        kind: ItemKind::Listing,
        priority: Priority::Normal,
        content: "2BHK for rent in Baner".into(),
        attribution: Attribution {
            posted_by: Some("Asha".into()),
            contact: Some("+91 90000 00000".into()),
        },
        tags: vec![],
        targets: targets.iter().map(|t| t.to_string()).collect(),
        schedule_mode: ScheduleMode::Once,
        next_post_at: due,
        remaining_posts: Some(1),
        source: "api".into(),
        source_ref: None,
        idempotency_key: None,
    }
}

pub mod contract {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use relaypost_core::error::RelayError;

    use crate::item::{ItemFilter, ItemStatus, Reschedule};
    use crate::store::QueueStore;

    /// Whole-second instant so every backend round-trips it exactly.
    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    pub async fn enqueue_and_get(store: Arc<dyn QueueStore>) {
        let created = store
            .enqueue(due_item(now(), &["grp-a", "grp-b"]))
            .await
            .unwrap();
        assert!(!created.duplicate);

        let item = store.get(&created.item.id).await.unwrap().unwrap();
        assert_eq!(item.id, created.item.id);
        assert_eq!(item.content, created.item.content);
        assert_eq!(item.next_post_at, now());
        assert_eq!(item.status, ItemStatus::Queued);
        assert_eq!(item.pending_targets, item.targets);
        assert_eq!(item.attribution.posted_by.as_deref(), Some("Asha"));
        assert_eq!(item.attempts, 0);
    }

    pub async fn idempotent_enqueue(store: Arc<dyn QueueStore>) {
        let mut first = due_item(now(), &["grp-a"]);
        first.idempotency_key = Some("whatsapp:wamid.1".into());
        let mut second = first.clone();
        second.content = "different body, same key".into();

        let a = store.enqueue(first).await.unwrap();
        let b = store.enqueue(second).await.unwrap();
        assert!(!a.duplicate);
        assert!(b.duplicate);
        assert_eq!(a.item.id, b.item.id);
        assert_eq!(b.item.content, "2BHK for rent in Baner");
        assert_eq!(store.summary().await.unwrap().total, 1);

        // Items without a key never collide.
        store.enqueue(due_item(now(), &[])).await.unwrap();
        store.enqueue(due_item(now(), &[])).await.unwrap();
        assert_eq!(store.summary().await.unwrap().total, 3);
    }

    pub async fn reserve_only_due_queued(store: Arc<dyn QueueStore>) {
        let due = store
            .enqueue(due_item(now() - Duration::minutes(5), &["grp-a"]))
            .await
            .unwrap()
            .item;
        let on_the_dot = store.enqueue(due_item(now(), &["grp-a"])).await.unwrap().item;
        let future = store
            .enqueue(due_item(now() + Duration::seconds(1), &["grp-a"]))
            .await
            .unwrap()
            .item;

        // The lease stamp is its own clock; only `due_by` filters.
        let stamped = now() + Duration::days(30);
        let reserved = store.reserve_due(now(), stamped, 10).await.unwrap();
        let ids: Vec<&str> = reserved.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![due.id.as_str(), on_the_dot.id.as_str()]);
        for item in &reserved {
            assert_eq!(item.status, ItemStatus::Processing);
            assert_eq!(item.updated_at, stamped);
        }

        let stored = store.get(&due.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Processing);
        let untouched = store.get(&future.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, ItemStatus::Queued);

        // Already processing: a second pass gets nothing.
        assert!(store.reserve_due(now(), now(), 10).await.unwrap().is_empty());
    }

    pub async fn reserve_respects_limit_and_order(store: Arc<dyn QueueStore>) {
        let h3 = store.enqueue(due_item(now() - Duration::hours(3), &[])).await.unwrap().item;
        let h1 = store.enqueue(due_item(now() - Duration::hours(1), &[])).await.unwrap().item;
        let h2 = store.enqueue(due_item(now() - Duration::hours(2), &[])).await.unwrap().item;

        let first = store.reserve_due(now(), now(), 2).await.unwrap();
        let ids: Vec<&str> = first.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![h3.id.as_str(), h2.id.as_str()]);

        let second = store.reserve_due(now(), now(), 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, h1.id);

        assert!(store.reserve_due(now(), now(), 2).await.unwrap().is_empty());
    }

    /// `a` and `b` must share backing state.
    pub async fn concurrent_reservation_is_exclusive(
        a: Arc<dyn QueueStore>,
        b: Arc<dyn QueueStore>,
    ) {
        const ITEMS: usize = 24;
        for n in 0..ITEMS {
            a.enqueue(due_item(now() - Duration::seconds(n as i64 + 1), &["grp-a"]))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for worker in 0..4 {
            let store = if worker % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                loop {
                    let batch = store.reserve_due(now(), now(), 3).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    mine.extend(batch.into_iter().map(|i| i.id));
                    tokio::task::yield_now().await;
                }
                mine
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.await.unwrap() {
                total += 1;
                assert!(seen.insert(id), "item reserved twice");
            }
        }
        assert_eq!(total, ITEMS);
        assert_eq!(a.summary().await.unwrap().processing, ITEMS);
    }

    pub async fn stale_recovery_cutoff(store: Arc<dyn QueueStore>) {
        let t0 = now();
        let t1 = t0 + Duration::minutes(10);
        store.enqueue(due_item(t0 - Duration::hours(2), &[])).await.unwrap();
        store.enqueue(due_item(t0 - Duration::hours(1), &[])).await.unwrap();

        let old = store.reserve_due(t0, t0, 1).await.unwrap().remove(0);
        let fresh = store.reserve_due(t1, t1, 1).await.unwrap().remove(0);

        // `fresh.updated_at == t1` is not strictly before the cutoff.
        assert_eq!(store.recover_stale_processing(t1).await.unwrap(), 1);
        assert_eq!(
            store.get(&old.id).await.unwrap().unwrap().status,
            ItemStatus::Queued
        );
        assert_eq!(
            store.get(&fresh.id).await.unwrap().unwrap().status,
            ItemStatus::Processing
        );

        // Queued, sent and failed items are never touched.
        assert_eq!(store.recover_stale_processing(t1).await.unwrap(), 0);
    }

    pub async fn outcome_transitions(store: Arc<dyn QueueStore>) {
        let posted = now();

        let once = store.enqueue(due_item(now(), &["grp-a"])).await.unwrap().item;
        store.reserve_due(now(), now(), 10).await.unwrap();
        store.mark_sent(&once.id, posted).await.unwrap();
        let sent = store.get(&once.id).await.unwrap().unwrap();
        assert_eq!(sent.status, ItemStatus::Sent);
        assert!(sent.pending_targets.is_empty());
        assert_eq!(sent.remaining_posts, Some(0));
        assert_eq!(sent.last_posted_at, Some(posted));
        assert_eq!(sent.attempts, 1);

        let failing = store
            .enqueue(due_item(now(), &["grp-a", "grp-b", "grp-c"]))
            .await
            .unwrap()
            .item;
        store
            .mark_failed(&failing.id, "dispatch partially failed", Some(vec!["grp-b".into()]))
            .await
            .unwrap();
        let failed = store.get(&failing.id).await.unwrap().unwrap();
        assert_eq!(failed.status, ItemStatus::Failed);
        assert_eq!(failed.pending_targets, vec!["grp-b".to_string()]);
        assert_eq!(failed.last_error.as_deref(), Some("dispatch partially failed"));
        assert_eq!(failed.attempts, 1);

        store.mark_failed(&failing.id, "again", None).await.unwrap();
        let failed = store.get(&failing.id).await.unwrap().unwrap();
        assert_eq!(failed.pending_targets, vec!["grp-b".to_string()]);
        assert_eq!(failed.attempts, 2);

        let mut weekly = due_item(now(), &["grp-a", "grp-b"]);
        weekly.schedule_mode = ScheduleMode::Weekly;
        weekly.remaining_posts = Some(2);
        let weekly = store.enqueue(weekly).await.unwrap().item;
        store
            .mark_failed(&weekly.id, "half", Some(vec!["grp-b".into()]))
            .await
            .unwrap();
        let next = now() + Duration::days(7);
        store
            .reschedule_after_send(
                &weekly.id,
                Reschedule {
                    next_post_at: next,
                    remaining_posts: Some(1),
                    posted_at: posted,
                },
            )
            .await
            .unwrap();
        let again = store.get(&weekly.id).await.unwrap().unwrap();
        assert_eq!(again.status, ItemStatus::Queued);
        assert_eq!(again.next_post_at, next);
        assert_eq!(again.remaining_posts, Some(1));
        assert_eq!(again.pending_targets, again.targets);
        assert_eq!(again.last_error, None);
        assert_eq!(again.last_posted_at, Some(posted));
    }

    pub async fn requeue_from_any_status(store: Arc<dyn QueueStore>) {
        let item = store.enqueue(due_item(now(), &["grp-a"])).await.unwrap().item;
        store.mark_failed(&item.id, "boom", None).await.unwrap();

        let before = Utc::now();
        let requeued = store.requeue(&item.id, None).await.unwrap();
        assert_eq!(requeued.status, ItemStatus::Queued);
        assert!(requeued.next_post_at >= before - Duration::seconds(1));
        assert_eq!(requeued.attempts, 1);
        assert_eq!(requeued.last_error.as_deref(), Some("boom"));

        let at = now() + Duration::days(2);
        store.mark_sent(&item.id, now()).await.unwrap();
        let requeued = store.requeue(&item.id, Some(at)).await.unwrap();
        assert_eq!(requeued.status, ItemStatus::Queued);
        assert_eq!(requeued.next_post_at, at);
    }

    pub async fn unknown_id_is_not_found(store: Arc<dyn QueueStore>) {
        assert!(store.get("missing").await.unwrap().is_none());
        assert!(matches!(
            store.mark_sent("missing", now()).await,
            Err(RelayError::NotFound(_))
        ));
        assert!(matches!(
            store.mark_failed("missing", "x", None).await,
            Err(RelayError::NotFound(_))
        ));
        assert!(matches!(
            store.requeue("missing", None).await,
            Err(RelayError::NotFound(_))
        ));
        assert!(matches!(
            store
                .reschedule_after_send(
                    "missing",
                    Reschedule {
                        next_post_at: now(),
                        remaining_posts: None,
                        posted_at: now(),
                    },
                )
                .await,
            Err(RelayError::NotFound(_))
        ));
    }

    pub async fn list_and_summary(store: Arc<dyn QueueStore>) {
        let first = store
            .enqueue(due_item(now() - Duration::hours(1), &[]))
            .await
            .unwrap()
            .item;
        let second = store
            .enqueue(due_item(now() + Duration::hours(5), &[]))
            .await
            .unwrap()
            .item;
        let third = store
            .enqueue(due_item(now() + Duration::hours(3), &[]))
            .await
            .unwrap()
            .item;

        let all = store.list(ItemFilter::default()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);

        let limited = store
            .list(ItemFilter {
                status: None,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        store.reserve_due(now(), now(), 10).await.unwrap();
        let processing = store
            .list(ItemFilter {
                status: Some(ItemStatus::Processing),
                limit: 50,
            })
            .await
            .unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, first.id);

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.queued, 2);
        assert_eq!(summary.processing, 1);
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.next_due_at, Some(third.next_post_at));
    }
}
