//! HttpUpdateSource against an in-process axum stub of the backend.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use caafw_updates::{
    Category, HttpUpdateSource, InMemoryQueryCache, UpdatePoller, UpdateSource,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Seen = Arc<Mutex<Vec<Option<String>>>>;

async fn check(
    State(seen): State<Seen>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let since = q.get("since").cloned();
    let first = since.is_none();
    seen.lock().unwrap().push(since);
    if first {
        // shape and naive timestamps as produced by the backend
        Json(json!({
            "has_updates": true,
            "total_new": 3,
            "categories": {"jobs": 2, "learning": 0, "events": 1, "research": 0},
            "checked_at": "2024-01-01T00:01:00.500000",
            "since": "2023-12-31T23:56:00"
        }))
    } else {
        Json(json!({
            "has_updates": false,
            "total_new": 0,
            "categories": {"jobs": 0, "learning": 0, "events": 0, "research": 0},
            "checked_at": "2024-01-01T00:02:00",
            "since": "2024-01-01T00:01:00.500000"
        }))
    }
}

async fn latest() -> Json<Value> {
    Json(json!({
        "timestamps": {
            "jobs": "2023-12-31T22:00:00",
            "learning": null,
            "events": "2024-01-01T00:00:30",
            "research": null
        },
        "checked_at": "2024-01-01T00:01:00"
    }))
}

async fn spawn_backend() -> (SocketAddr, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/api/v1/updates/check", get(check))
        .route("/api/v1/updates/latest", get(latest))
        .route(
            "/broken/updates/check",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, seen)
}

#[tokio::test]
async fn omits_since_first_then_sends_rfc3339_cursor() {
    let (addr, seen) = spawn_backend().await;
    let source =
        HttpUpdateSource::new(format!("http://{addr}/api/v1/"), Duration::from_secs(5)).unwrap();
    assert_eq!(source.base_url(), format!("http://{addr}/api/v1"));

    let cache = Arc::new(InMemoryQueryCache::new());
    let poller = UpdatePoller::new(Arc::new(source), cache.clone());

    let first = poller.check_for_updates().await.unwrap();
    assert_eq!(first.total_new, 3);
    assert_eq!(
        poller.summary().as_deref(),
        Some("New content: 2 jobs, 1 event")
    );

    let second = poller.check_for_updates().await.unwrap();
    assert!(!second.has_updates);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![None, Some("2024-01-01T00:01:00.500Z".to_string())]
    );
    assert_eq!(
        poller.last_checked(),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap())
    );

    poller.refresh_data().await;
    assert_eq!(cache.generation(Category::Research), 1);
}

#[tokio::test]
async fn latest_timestamps_are_parsed() {
    let (addr, _seen) = spawn_backend().await;
    let source =
        HttpUpdateSource::new(format!("http://{addr}/api/v1"), Duration::from_secs(5)).unwrap();

    let latest = source.latest_timestamps().await.unwrap();
    let (cat, ts) = latest.newest().unwrap();
    assert_eq!(cat, Category::Events);
    assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap());
}

#[tokio::test]
async fn server_error_is_swallowed_by_poller() {
    let (addr, _seen) = spawn_backend().await;
    let source =
        HttpUpdateSource::new(format!("http://{addr}/broken"), Duration::from_secs(5)).unwrap();
    assert!(source.check_since(None).await.is_err());

    let poller = UpdatePoller::new(Arc::new(source), Arc::new(InMemoryQueryCache::new()));
    assert!(poller.check_for_updates().await.is_none());
    assert!(poller.last_checked().is_none());
    assert!(!poller.is_polling());
    assert!(poller.latest_timestamps().await.is_none());
}
