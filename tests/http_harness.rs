#![allow(unused)]
//! `GET /logs` integration harness.
//!
//! Drives the query router in-process with `tower::ServiceExt::oneshot`.
//!
//! # What this covers
//!
//! - **Happy path**: cursor pagination and filters map from query parameters.
//! - **Validation**: bad parameters answer 400 and name the field.
//! - **Sink failure**: answers 500 with a fixed message.
//! - **Caching**: repeated requests within the TTL hit the sink once.
//!
//! # What this does NOT cover
//!
//! - Serving over a socket (see `pipeline_harness`)
//!
//! # Running
//!
//! ```sh
//! cargo test --test http_harness
//! ```

mod common;
use common::*;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use logrelay_core::{LogLevel, QueryCache};
use logrelay_stream::query_routes;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Value};
use tower::ServiceExt;

fn router_over(sink: Arc<CountingSink>) -> Router {
    query_routes(Arc::new(QueryCache::new(sink)), 20)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn body_stamps(body: &Value) -> Vec<i64> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["startTimestamp"].as_i64().unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

/// The canonical cursor example, over HTTP.
#[tokio::test]
async fn descending_cursor_over_http() {
    let router = router_over(CountingSink::new(seeded_store(&[1, 2, 3, 4, 5])));

    let (status, body) = get(&router, "/logs?orderBy=desc&cursorTimestamp=4&page=1&pageSize=2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body_stamps(&body), vec![4, 3]);
    assert_eq!(body["cursor"], json!({ "prev": 4, "next": 3 }));
}

/// Level and identity filters are applied.
#[tokio::test]
async fn filters_from_query_string() {
    let store = seeded_store(&[]);
    store.record_at(1, "a", "lobby", "u1", LogLevel::Info, "hello");
    store.record_at(2, "a", "lobby", "u2", LogLevel::Error, "oops");
    store.record_at(3, "a", "attic", "u1", LogLevel::Error, "dust");
    let router = router_over(CountingSink::new(store));

    let (status, body) = get(&router, "/logs?roomId=lobby&level=error").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["message"], "oops");
    assert_eq!(body["data"][0]["userId"], "u2");
}

/// An empty page serializes an empty cursor object.
#[tokio::test]
async fn empty_page_cursor_is_empty_object() {
    let router = router_over(CountingSink::new(seeded_store(&[])));
    let (status, body) = get(&router, "/logs").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["cursor"], json!({}));
}

// ---------------------------------------------------------------------------
// Validation / failure
// ---------------------------------------------------------------------------

/// Each bad parameter answers 400 naming itself, without touching the sink.
#[rstest]
#[case::page_size_zero("/logs?pageSize=0", "pageSize")]
#[case::page_size_101("/logs?pageSize=101", "pageSize")]
#[case::page_zero("/logs?page=0", "page")]
#[case::bad_order("/logs?orderBy=up", "orderBy")]
#[case::bad_cursor("/logs?cursorTimestamp=abc", "cursorTimestamp")]
#[case::bad_start("/logs?startTimestamp=abc", "startTimestamp")]
#[case::bad_level("/logs?level=verbose", "level")]
#[tokio::test]
async fn bad_parameters_are_400(#[case] uri: &str, #[case] field: &str) {
    let sink = CountingSink::new(seeded_store(&[1]));
    let router = router_over(sink.clone());

    let (status, body) = get(&router, uri).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], field);
    assert_eq!(sink.reads(), 0);
}

/// Sink failure answers 500 without leaking the cause.
#[tokio::test]
async fn sink_failure_is_500() {
    let router = query_routes(Arc::new(QueryCache::new(Arc::new(FailingSink))), 20);
    let (status, body) = get(&router, "/logs").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "failed to fetch logs" }));
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

/// Identical requests share one fetch; a different page fetches again.
#[tokio::test]
async fn repeated_requests_hit_cache() {
    let sink = CountingSink::new(seeded_store(&[1, 2, 3]));
    let router = router_over(sink.clone());

    get(&router, "/logs?pageSize=2").await;
    get(&router, "/logs?pageSize=2").await;
    assert_eq!(sink.reads(), 1);

    get(&router, "/logs?pageSize=2&page=2").await;
    assert_eq!(sink.reads(), 2);
}
