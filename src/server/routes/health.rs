use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use serde_json::json;

use crate::server::error::{ServerError, ServerResult};
use crate::server::state::ServerState;

pub(crate) fn started() -> &'static Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now)
}

/// Liveness check. Also touches the store so a broken database file shows up
/// as a failed health check.
pub async fn health_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let rooms = state.blocking(|bot| bot.rooms()).await?;

    Ok(Json(json!({
        "status": "healthy",
        "service": "adbot",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": started().elapsed().as_secs(),
        "rooms": rooms.len(),
        "ghost": state.config.ghost,
    })))
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let handle = state.prometheus.as_ref().ok_or(ServerError::NotFound)?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], handle.render()))
}
