//! Speech side: one request per chat message, one per confirmed delivery.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::auction::{BillReceipt, Selection};
use crate::server::error::{ServerError, ServerResult};
use crate::server::state::ServerState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub room: String,
    pub message: String,
    /// Viewers in the room, which is also the impression count on delivery.
    pub audience: u64,
    /// Bill immediately. Clients that deliver asynchronously send `false`
    /// and confirm through `/api/v1/impressions` with the returned token.
    #[serde(default = "default_deliver")]
    pub deliver: bool,
}

fn default_deliver() -> bool {
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpeechResponse {
    /// Text to post in the room. Absent when nothing sold, when the ad is
    /// not yet delivered, or in ghost mode.
    pub reply: Option<String>,
    pub selection: Option<Selection>,
    pub receipt: Option<BillReceipt>,
    /// Claims a deferred selection exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Messages since the room's last ad, after this request.
    pub cooldown: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImpressionRequest {
    pub room: String,
    pub token: String,
    pub impressions: u64,
}

pub async fn handle_speech(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<SpeechRequest>,
) -> ServerResult<Json<SpeechResponse>> {
    let room = room_name(&req.room)?;
    let cooldown = state.cooldown(&room);

    let message = req.message;
    let audience = req.audience;
    let selection = state
        .blocking(move |bot| bot.evaluate(&message, audience, cooldown))
        .await?;

    let Some(selection) = selection else {
        let cooldown = state.bump_cooldown(&room);
        return Ok(Json(SpeechResponse {
            cooldown,
            ..SpeechResponse::default()
        }));
    };

    if !req.deliver {
        let token = state.issue_pending(&room, req.audience, selection.clone());
        return Ok(Json(SpeechResponse {
            selection: Some(selection),
            token: Some(token),
            cooldown,
            ..SpeechResponse::default()
        }));
    }

    deliver(&state, room, selection, req.audience).await.map(Json)
}

pub async fn record_impression(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ImpressionRequest>,
) -> ServerResult<Json<SpeechResponse>> {
    let room = room_name(&req.room)?;
    let pending = state.claim_pending(&req.token).ok_or(ServerError::NotFound)?;
    if pending.room != room {
        return Err(ServerError::BadRequest(format!(
            "selection was issued for &{}",
            pending.room
        )));
    }
    if req.impressions > pending.audience {
        return Err(ServerError::BadRequest(format!(
            "at most {} impressions for this selection",
            pending.audience
        )));
    }
    deliver(&state, room, pending.selection, req.impressions)
        .await
        .map(Json)
}

/// Bill, reset the room's cooldown and notify the control rooms.
async fn deliver(
    state: &ServerState,
    room: String,
    selection: Selection,
    impressions: u64,
) -> ServerResult<SpeechResponse> {
    let receipt = {
        let room = room.clone();
        let selection = selection.clone();
        state
            .blocking(move |bot| bot.record_impression(&room, &selection, impressions))
            .await?
    };
    state.reset_cooldown(&room);
    state.broadcast(&format!(
        "/me delivered creative {} to &{} at a price of {}",
        selection.creative.name, room, receipt.price
    ));

    let reply = if state.config.ghost {
        None
    } else {
        Some(format!("sponsored message: {}", selection.creative.content))
    };
    Ok(SpeechResponse {
        reply,
        selection: Some(selection),
        receipt: Some(receipt),
        cooldown: 0,
        ..SpeechResponse::default()
    })
}

fn room_name(raw: &str) -> ServerResult<String> {
    let room = raw.trim().trim_start_matches('&').to_lowercase();
    if room.is_empty() {
        return Err(ServerError::BadRequest("room must not be empty".to_string()));
    }
    Ok(room)
}
