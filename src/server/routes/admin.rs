//! Administrative endpoints: chat commands and read-only reports.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::cents::Cents;
use crate::command::{self, Caller};
use crate::ledger::{Advertiser, LedgerEntry};
use crate::scoreboard::{Metrics, ScoreboardEntry};
use crate::server::error::{ServerError, ServerResult};
use crate::server::state::ServerState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandRequest {
    pub caller: Caller,
    pub line: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    /// `None` when the line was not a `!command`.
    pub reply: Option<String>,
}

pub async fn run_command(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CommandRequest>,
) -> ServerResult<Json<CommandResponse>> {
    let reply = state
        .blocking(move |bot| Ok(command::dispatch(bot, &req.caller, &req.line)))
        .await?;
    Ok(Json(CommandResponse { reply }))
}

pub async fn scoreboard(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<Json<Vec<ScoreboardEntry>>> {
    let entries = state.blocking(|bot| bot.scoreboard()).await?;
    Ok(Json(entries))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    #[serde(flatten)]
    pub advertiser: Advertiser,
    pub metrics: Metrics,
}

pub async fn get_account(
    State(state): State<Arc<ServerState>>,
    Path(account): Path<String>,
) -> ServerResult<Json<AccountResponse>> {
    let response = state
        .blocking(move |bot| {
            Ok(AccountResponse {
                advertiser: bot.advertiser(&account)?,
                metrics: bot.metrics(&account)?,
            })
        })
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerResponse {
    pub account: String,
    pub balance: Cents,
    pub entries: Vec<LedgerEntry>,
}

pub async fn account_ledger(
    State(state): State<Arc<ServerState>>,
    Path(account): Path<String>,
    Query(query): Query<LedgerQuery>,
) -> ServerResult<Json<LedgerResponse>> {
    if query.limit == Some(0) {
        return Err(ServerError::BadRequest("limit must be at least 1".to_string()));
    }
    let response = state
        .blocking(move |bot| {
            let limit = query.limit.unwrap_or(bot.ledger_page());
            Ok(LedgerResponse {
                balance: bot.balance(&account)?,
                entries: bot.ledger_entries(&account, limit)?,
                account,
            })
        })
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct NickRequest {
    pub nick: String,
}

pub async fn set_nick(
    State(state): State<Arc<ServerState>>,
    Path(account): Path<String>,
    Json(req): Json<NickRequest>,
) -> ServerResult<StatusCode> {
    let nick = req.nick.trim().to_string();
    if nick.is_empty() {
        return Err(ServerError::BadRequest("nick must not be empty".to_string()));
    }
    state
        .blocking(move |bot| bot.set_nick(&account, &nick))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
