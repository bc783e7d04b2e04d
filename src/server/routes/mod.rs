//! API route handlers
//!
//! - `health`: liveness and Prometheus metrics
//! - `speech`: auction per chat message and delivery confirmation
//! - `admin`: chat commands, accounts and reports

pub mod admin;
pub mod health;
pub mod speech;

use crate::server::error::ServerError;

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
