pub mod auth;
pub mod comments;
pub mod geocode;
pub mod posts;
pub mod profile;
pub mod storage;
pub mod tags;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{CONTENT_TYPE, COOKIE};
use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

async fn health() -> &'static str {
    "ok"
}

async fn not_found() -> AppError {
    AppError::NotFound
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes;

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([CONTENT_TYPE, COOKIE]);

    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(tags::router())
        .merge(profile::router())
        .merge(geocode::router())
        .merge(storage::router())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
