//! HTTP server implementation using Axum.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relaypost_core::config::GatewayConfig;
use relaypost_scheduler::{DispatchPath, Intake};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<Intake>,
    /// Manual cycles go through the same path as scheduled ones.
    pub dispatch: Arc<DispatchPath>,
    pub pairing_code: Option<String>,
    pub start_time: std::time::Instant,
}

/// Pairing code auth middleware. Accepts the X-Pairing-Code header or a ?code= query.
async fn require_pairing(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    // If no pairing code configured, allow all
    let Some(expected) = &state.pairing_code else {
        return next.run(req).await;
    };

    let from_header = req
        .headers()
        .get("X-Pairing-Code")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let from_query = req
        .uri()
        .query()
        .unwrap_or("")
        .split('&')
        .filter_map(|pair| pair.strip_prefix("code="))
        .any(|code| code == expected);
    if from_header == expected || from_query {
        return next.run(req).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "ok": false,
            "error": "Unauthorized: invalid or missing pairing code"
        })),
    )
        .into_response()
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    // Protected routes: need the pairing code when one is configured
    let protected = Router::new()
        .route(
            "/api/v1/queue/items",
            get(super::routes::list_items).post(super::routes::submit_item),
        )
        .route("/api/v1/queue/items/{id}", get(super::routes::get_item))
        .route(
            "/api/v1/queue/items/{id}/requeue",
            post(super::routes::requeue_item),
        )
        .route("/api/v1/queue/status", get(super::routes::queue_status))
        .route("/api/v1/queue/dispatch", post(super::routes::dispatch_now))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_pairing,
        ));

    let public = Router::new().route("/health", get(super::routes::health_check));

    protected
        .merge(public)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // Example: RELAYPOST_CORS_ORIGINS=https://ops.example.com
            if let Ok(origins_str) = std::env::var("RELAYPOST_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server; returns when `shutdown` resolves.
pub async fn start(
    config: &GatewayConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
