//! HTTP route handlers for the web interface.
//!
//! The router is handed to the server bootstrap as an opaque request
//! handler; nothing here knows which transport or port it ends up behind.
//! When `base_url` is configured the whole application is mounted under that
//! prefix.

pub mod health;
pub mod home;

use axum::{routing::get, Router};
use ::http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{CACHE_CONTROL_STATIC, STATIC_DIR};
use crate::middleware::trace_requests;
use crate::state::AppState;

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let base_url = state.config.http.base_url.clone();

    // Static assets - long cache with immutable hint
    let static_routes = Router::new()
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_STATIC),
        ));

    let app = Router::new()
        .route("/", get(home::index))
        .route("/health", get(health::health))
        .merge(static_routes)
        .with_state(state)
        .layer(axum::middleware::from_fn(trace_requests));

    if base_url.is_empty() {
        app
    } else {
        Router::new().nest(&base_url, app)
    }
}
