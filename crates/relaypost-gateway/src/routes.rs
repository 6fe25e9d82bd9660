//! API route handlers for the gateway.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use relaypost_core::error::RelayError;
use relaypost_scheduler::{ItemFilter, ItemStatus, RunOptions, Submission};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::server::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);
type ApiResult = Result<Json<serde_json::Value>, ApiError>;

/// Map a library error onto an HTTP status with the usual `{"ok": false}` body.
fn api_error(err: RelayError) -> ApiError {
    let status = match &err {
        RelayError::Validation(_) => StatusCode::BAD_REQUEST,
        RelayError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("❌ API error: {err}");
    }
    (
        status,
        Json(serde_json::json!({"ok": false, "error": err.to_string()})),
    )
}

/// Optional JSON body: empty means defaults.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| api_error(RelayError::Validation(format!("invalid JSON body: {e}"))))
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "relaypost-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Intake: validate and enqueue one submission.
pub async fn submit_item(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<Submission>,
) -> ApiResult {
    let enqueued = state
        .intake
        .submit(submission, Utc::now())
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "item": enqueued.item,
        "duplicate": enqueued.duplicate,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<ItemStatus>()
                .map_err(|e| api_error(RelayError::Validation(e)))?,
        ),
        None => None,
    };
    let mut filter = ItemFilter {
        status,
        ..ItemFilter::default()
    };
    if let Some(limit) = query.limit {
        filter.limit = limit;
    }

    let items = state
        .dispatch
        .dispatcher()
        .store()
        .list(filter)
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "count": items.len(),
        "items": items,
    })))
}

pub async fn get_item(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let item = state
        .dispatch
        .dispatcher()
        .store()
        .get(&id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(RelayError::NotFound(id)))?;
    Ok(Json(serde_json::json!({"ok": true, "item": item})))
}

#[derive(Debug, Default, Deserialize)]
pub struct RequeueBody {
    pub next_post_at: Option<DateTime<Utc>>,
}

/// Operator override: back to `queued` regardless of status.
pub async fn requeue_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let body: RequeueBody = optional_body(&body)?;
    let item = state
        .dispatch
        .dispatcher()
        .store()
        .requeue(&id, body.next_post_at)
        .await
        .map_err(api_error)?;
    tracing::info!(id = %item.id, due = %item.next_post_at, "🔁 requeued");
    Ok(Json(serde_json::json!({"ok": true, "item": item})))
}

/// Scheduler configuration, running flag, last report and queue counts.
pub async fn queue_status(State(state): State<Arc<AppState>>) -> ApiResult {
    let report = state
        .dispatch
        .dispatcher()
        .status_report()
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "scheduler": report.scheduler,
        "store": report.store,
        "queue": report.queue,
        "dispatch_path": state.dispatch.name(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct DispatchBody {
    /// Evaluation instant override.
    pub now: Option<DateTime<Utc>>,
    pub dry_run: Option<bool>,
}

/// Run one manual cycle and return its report.
pub async fn dispatch_now(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let body: DispatchBody = optional_body(&body)?;
    let mut options = RunOptions::manual();
    if let Some(now) = body.now {
        options = options.at(now);
    }
    if let Some(dry_run) = body.dry_run {
        options = options.dry_run(dry_run);
    }
    let report = state.dispatch.run(options).await;
    Ok(Json(serde_json::json!({"ok": true, "report": report})))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use relaypost_channels::SimulatedSender;
    use relaypost_scheduler::{
        DispatchPath, DispatchSettings, Dispatcher, InMemoryStore, Intake, KeywordClassifier,
        QueueStore,
    };

    /// In-memory store, simulated sender, default target `grp-a`.
    pub fn test_app_state() -> AppState {
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryStore::new());
        let classifier = Arc::new(KeywordClassifier::new());
        let mut settings = DispatchSettings::default();
        settings.default_targets = vec!["grp-a".into()];
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(SimulatedSender::new()),
            classifier.clone(),
            settings,
        ));
        AppState {
            intake: Arc::new(Intake::new(store, classifier)),
            dispatch: Arc::new(DispatchPath::Direct(dispatcher)),
            pairing_code: None,
            start_time: std::time::Instant::now(),
        }
    }
}
