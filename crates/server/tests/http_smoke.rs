//! Smoke tests for the plain HTTP surface (spec §6): `/healthz`, `/readyz`,
//! `/metrics`. The `/ws/voice` upgrade route is exercised indirectly by
//! `turn_lifecycle.rs`, which drives the `Session` it hands off to directly.
//! Grounded on the idiomatic axum testing path — build the `Router`, drive
//! it in-process with `tower::ServiceExt::oneshot`, no bound socket needed.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;
use voice_gateway_config::Settings;
use voice_gateway_server::{create_router, AppState};

fn router() -> axum::Router {
    let tempdir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.memory.db_path = tempdir.path().join("memory").to_str().unwrap().to_string();
    // Leaked deliberately: the router returned from this function needs to
    // outlive the tempdir for the life of the test, and the sled store it
    // opens must not be deleted out from under it.
    std::mem::forget(tempdir);

    // A fresh, uninstalled recorder per router — `AppState` only needs a
    // `PrometheusHandle` to render `/metrics`, and these tests don't need a
    // single process-wide recorder the way the real binary does in `main.rs`.
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

    let state = AppState::new(settings, metrics_handle).expect("AppState::new");
    create_router(state)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let response = router()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readyz_reports_configured_upstreams() {
    let response = router()
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ready");
    assert!(body["upstream"]["stt"].is_string());
}

#[tokio::test]
async fn metrics_exposes_prometheus_text_format() {
    let response = router()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = router()
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
