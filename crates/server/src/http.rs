//! Router construction: the health/readiness checks, the Prometheus
//! scrape endpoint, and the `/ws/voice` upgrade route. No REST surface —
//! the gateway is WebSocket-first per spec §6.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket::ws_handler;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/voice", get(ws_handler))
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness: the process is up and the tool registry initialized. Doesn't
/// probe upstreams — that's `readyz`'s job.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let tool_count = state.turn_deps.tools.list_definitions().len();
    let body = serde_json::json!({
        "status": "ok",
        "tools": tool_count,
    });
    (StatusCode::OK, Json(body))
}

/// Readiness: reports configured upstream endpoints without probing them
/// over the network on every scrape — a failed adapter call surfaces as a
/// per-turn `UPSTREAM`/`UPSTREAM_FATAL` error instead, which is cheaper and
/// matches how the gateway already classifies those failures.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let upstream = &state.settings.upstream;
    let body = serde_json::json!({
        "status": "ready",
        "upstream": {
            "stt": upstream.stt_endpoint,
            "tts": upstream.tts_endpoint,
            "llm_main": upstream.llm_main_endpoint,
            "llm_fast": upstream.llm_fast_endpoint,
        },
    });
    (StatusCode::OK, Json(body))
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .render()
}
