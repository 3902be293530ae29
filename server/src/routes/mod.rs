//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The chat web bundle is a single-page app. Files that exist in the bundle
//! directory are served with a one-day cache lifetime; `/health` answers the
//! hosting platform's health check; every other GET falls back to `index.html` so the
//! app's client-side router can take over.

pub mod health;
pub mod spa;


use axum::Router;
use axum::handler::Handler;
use axum::http::HeaderValue;
use axum::http::header::CACHE_CONTROL;
use axum::routing::get;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeader;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Cache lifetime for bundle assets.
const ASSET_CACHE_CONTROL: &str = "public, max-age=86400";

pub fn app(state: AppState) -> Router {
    let index = spa::serve_index.with_state(state.clone());
    let assets = ServeDir::new(state.static_dir()).fallback(index);
    let assets = SetResponseHeader::if_not_present(assets, CACHE_CONTROL, HeaderValue::from_static(ASSET_CACHE_CONTROL));

    Router::new()
        .route("/health", get(health::health))
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
