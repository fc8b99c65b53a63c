// MIT License
// Copyright (c) 2024 Graham King

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use http::{HeaderValue, Method, StatusCode};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::interactions::{NewComment, NewLike, Store, StoreError};

pub const INTERACTIONS_PATH: &str = "/api/interactions";
pub const ADD_LIKE_PATH: &str = "/api/interactions/add-like";
pub const ADD_COMMENT_PATH: &str = "/api/interactions/add-comment";

pub type SharedStore = Arc<dyn Store>;

/// All the interaction routes, CORS headers on every response.
///
/// Routes are method specific: a known path with the wrong method gets
/// `405 Method Not Allowed`, an unknown path `404`. `OPTIONS` is always `200`.
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route(INTERACTIONS_PATH, get(get_interactions))
        .route(ADD_LIKE_PATH, post(add_like))
        .route(ADD_COMMENT_PATH, post(add_comment))
        .fallback(not_found)
        .with_state(store)
        .layer(middleware::from_fn(preflight))
        .layer(TraceLayer::new_for_http())
        // Outermost, so the preflight and 404 responses get them too
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
}

// Any OPTIONS is a CORS preflight, whatever the path
async fn preflight(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(req).await
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found")
}

async fn get_interactions(
    State(store): State<SharedStore>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    // First title wins, other keys are ignored. Absent means the empty title.
    let title = params
        .into_iter()
        .find(|(key, _)| key == "title")
        .map(|(_, value)| value)
        .unwrap_or_default();
    match with_store(store, move |s| s.interactions(&title)).await {
        Ok(interactions) => Json(interactions).into_response(),
        Err(err) => store_failed(err),
    }
}

async fn add_like(State(store): State<SharedStore>, body: Bytes) -> Response {
    let like: NewLike = match serde_json::from_slice(&body) {
        Ok(like) => like,
        Err(err) => return bad_request(err),
    };
    match with_store(store, move |s| s.add_like(&like)).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => store_failed(err),
    }
}

async fn add_comment(State(store): State<SharedStore>, body: Bytes) -> Response {
    let comment: NewComment = match serde_json::from_slice(&body) {
        Ok(comment) => comment,
        Err(err) => return bad_request(err),
    };
    match with_store(store, move |s| s.add_comment(&comment)).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => store_failed(err),
    }
}

// sqlite calls block, keep them off the async workers
async fn with_store<T, F>(store: SharedStore, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Store) -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(store.as_ref())).await?
}

fn bad_request(err: serde_json::Error) -> Response {
    tracing::debug!(%err, "rejecting request body");
    (StatusCode::BAD_REQUEST, err.to_string()).into_response()
}

fn store_failed(err: StoreError) -> Response {
    tracing::error!(%err, "interaction store failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}
