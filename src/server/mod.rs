//! HTTP surface for adbot.
//!
//! Public routes: `/health`, `/metrics`. Everything under `/api/v1` requires
//! an API key when any are configured. Store access from handlers always goes
//! through [`ServerState::blocking`], so no redb transaction is ever held
//! across an await point.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::engine::Adbot;
use crate::server::middleware::{api_key_auth, log_requests};
use crate::server::routes::{admin, health, not_found, speech};

pub use crate::server::error::{ServerError, ServerResult};
pub use crate::server::state::{Broadcast, ServerState};

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the router with all routes and middleware.
pub fn build_router(state: Arc<ServerState>) -> Router {
    health::started();

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics));

    let protected_routes = Router::new()
        .route("/api/v1/speech", post(speech::handle_speech))
        .route("/api/v1/impressions", post(speech::record_impression))
        .route("/api/v1/commands", post(admin::run_command))
        .route("/api/v1/scoreboard", get(admin::scoreboard))
        .route("/api/v1/accounts/{id}", get(admin::get_account))
        .route("/api/v1/accounts/{id}/ledger", get(admin::account_ledger))
        .route("/api/v1/accounts/{id}/nick", put(admin::set_nick))
        .layer(from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn start_server(
    config: ServerConfig,
    bot: Arc<Adbot>,
    broadcast: Option<Broadcast>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = config.socket_addr()?;

    let mut state = ServerState::new(config.clone(), bot);
    if let Some(broadcast) = broadcast {
        state = state.with_broadcast(broadcast);
    }
    if config.metrics_enabled {
        state = state.with_prometheus(telemetry::install()?);
    }
    let app = build_router(Arc::new(state));

    tracing::info!(
        %addr,
        api_keys = config.api_keys.len(),
        control_rooms = config.control_rooms.len(),
        ghost = config.ghost,
        metrics = config.metrics_enabled,
        timeout_secs = config.timeout_secs,
        "starting adbot server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
