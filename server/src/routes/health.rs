use axum::Json;
use axum::extract::State;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
    service: &'static str,
    timestamp: String,
    uptime: f64,
    port: u16,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        service: "frontend",
        timestamp: now_rfc3339(),
        uptime: state.uptime(),
        port: state.port(),
    })
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}
