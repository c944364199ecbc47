//! `GET /logs`: the query cache over HTTP.
//!
//! Query parameters use the same camelCase names as the JSON model. A
//! validation failure answers `400 {"error", "field"}`; a sink failure answers
//! `500 {"error": "failed to fetch logs"}` with the cause only in the server
//! log.
//!
//! Follow `cursor.next` with `orderBy=desc` to walk back through history. An
//! ascending query with a cursor always returns the newest matching page.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use logrelay_core::{Error, QueryCache, RawLogQuery};
use serde_json::json;
use tracing::debug;

#[derive(Clone)]
struct QueryState {
    cache: Arc<QueryCache>,
    default_page_size: u32,
}

pub fn query_routes(cache: Arc<QueryCache>, default_page_size: u32) -> Router {
    Router::new().route("/logs", get(get_logs)).with_state(QueryState {
        cache,
        default_page_size,
    })
}

async fn get_logs(State(state): State<QueryState>, Query(raw): Query<RawLogQuery>) -> Response {
    let request = match raw.parse(state.default_page_size) {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    match state
        .cache
        .get_ordered_logs(&request.query, request.page, request.page_size)
        .await
    {
        Ok(result) => Json(result.as_ref()).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(err: Error) -> Response {
    match err.field() {
        Some(field) => {
            debug!(field, error = %err, "rejected log query");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string(), "field": field })),
            )
                .into_response()
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": Error::QueryFailed.to_string() })),
        )
            .into_response(),
    }
}
