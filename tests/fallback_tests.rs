// SPDX-License-Identifier: MIT

//! Dual-backend fallback policy, exercised through the HTTP surface
//! with stub document backends.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{CountingRouter, MemoryBackend};
use std::sync::Arc;
use tower::ServiceExt;
use trek_tracker::db::PositionBackend;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn test_credential_failure_falls_back_to_sqlite() {
    let primary = Arc::new(MemoryBackend::failing_credentials());
    let (app, _) = common::create_test_app_with(
        Some(primary as Arc<dyn PositionBackend>),
        Arc::new(CountingRouter::new()),
    )
    .await;

    // The write silently lands in the relational store.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/positions")
                .header("x-admin-code", "secure123")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"lat": 43.7, "lng": 3.95}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Reads fall back the same way: seeded start plus the new one.
    let response = app
        .oneshot(Request::get("/api/positions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let positions = body_json(response).await;
    assert_eq!(positions.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_non_credential_failure_propagates() {
    let primary = Arc::new(MemoryBackend::failing_with(
        "4 DEADLINE_EXCEEDED: deadline exceeded",
    ));
    let (app, _) = common::create_test_app_with(
        Some(primary as Arc<dyn PositionBackend>),
        Arc::new(CountingRouter::new()),
    )
    .await;

    let response = app
        .oneshot(Request::get("/api/positions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_healthy_primary_is_preferred() {
    let primary = Arc::new(MemoryBackend::new());
    let (app, _) = common::create_test_app_with(
        Some(primary as Arc<dyn PositionBackend>),
        Arc::new(CountingRouter::new()),
    )
    .await;

    // The document backend starts empty while SQLite holds the seeded
    // start position. An empty list proves the primary answered.
    let response = app
        .clone()
        .oneshot(Request::get("/api/positions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let positions = body_json(response).await;
    assert_eq!(positions.as_array().unwrap().len(), 0);

    // The escape hatch still reads the relational store.
    let response = app
        .oneshot(
            Request::get("/api/positions?source=sqlite")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let positions = body_json(response).await;
    assert_eq!(positions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_write_through_healthy_primary() {
    let primary = Arc::new(MemoryBackend::new());
    let (app, _) = common::create_test_app_with(
        Some(primary.clone() as Arc<dyn PositionBackend>),
        Arc::new(CountingRouter::new()),
    )
    .await;

    let response = app
        .oneshot(
            Request::post("/api/positions")
                .header("x-admin-code", "secure123")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"lat": 43.7, "lng": 3.95}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    // Document ids are generated keys, not row numbers.
    assert!(json["position"]["id"].as_str().unwrap().starts_with("doc-"));
    assert_eq!(primary.count_positions().await.unwrap(), Some(1));
}
