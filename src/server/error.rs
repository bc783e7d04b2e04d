use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::campaign::CampaignError;
use crate::error::AdbotError;
use crate::ledger::LedgerError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Adbot(#[from] AdbotError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,
}

/// API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Adbot(err) if err.is_internal() => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Adbot(AdbotError::Ledger(LedgerError::InsufficientFunds { .. })) => {
                StatusCode::PAYMENT_REQUIRED
            }
            ServerError::Adbot(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServerError::Authentication(_) => "AUTH_FAILED",
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::NotFound => "NOT_FOUND",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::Adbot(err) => match err {
                AdbotError::Store(_) => "STORE_ERROR",
                AdbotError::Ledger(LedgerError::InsufficientFunds { .. }) => "INSUFFICIENT_FUNDS",
                AdbotError::Ledger(LedgerError::Store(_)) => "STORE_ERROR",
                AdbotError::Ledger(_) => "LEDGER_ERROR",
                AdbotError::Campaign(CampaignError::Store(_)) => "STORE_ERROR",
                AdbotError::Campaign(_) => "CAMPAIGN_ERROR",
                AdbotError::Config(_) => "CONFIG_ERROR",
                AdbotError::Amount(_) => "INVALID_AMOUNT",
                AdbotError::Usage(_) => "USAGE",
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("blocking task failed: {err}"))
    }
}
