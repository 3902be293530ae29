//! Client-side routing fallback.

use axum::Json;
use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde_json::json;
use tracing::error;

use super::health::now_rfc3339;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum SpaError {
    #[error("failed to read {path}: {source}")]
    Index {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl IntoResponse for SpaError {
    fn into_response(self) -> Response {
        error!(error = %self, "spa: cannot serve application");
        let body = json!({
            "error": "Failed to serve application",
            "timestamp": now_rfc3339(),
        });
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CACHE_CONTROL, "no-store")],
            Json(body),
        )
            .into_response()
    }
}

/// Serve `index.html` for any path the bundle does not contain.
pub async fn serve_index(State(state): State<AppState>) -> Result<Response, SpaError> {
    let path = state.static_dir().join("index.html");
    let html = tokio::fs::read_to_string(&path).await.map_err(|source| SpaError::Index {
        path: path.display().to_string(),
        source,
    })?;

    let mut response = Html(html).into_response();
    // The shell must not be cached like hashed assets are.
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}
