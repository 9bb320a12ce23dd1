use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

use hub_gateway::run_blocking;
use hub_types::api::{BotMessageRequest, Claims, CreateBotRequest, CreateBotResponse, SetBotActiveRequest};
use hub_types::events::ServerEvent;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::author;

/// Header carrying the plaintext bot key on `POST /bot/messages`.
pub const BOT_KEY_HEADER: &str = "x-bot-key";

pub async fn list_bots(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bots = run_blocking(&state.service, move |svc| svc.list_bots(&community_id)).await?;
    Ok(Json(bots))
}

pub async fn create_bot(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let (bot, api_key) = run_blocking(&state.service, move |svc| {
        svc.create_bot(&community_id, &actor, &req.name, req.description.as_deref())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(CreateBotResponse { bot, api_key })))
}

pub async fn set_bot_active(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetBotActiveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let bot = run_blocking(&state.service, move |svc| {
        svc.set_bot_active(&bot_id, &actor, req.is_active)
    })
    .await?;
    Ok(Json(bot))
}

/// Bot entry point. Authenticated by API key instead of a session; the posted
/// message is fanned out like any other.
pub async fn post_bot_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BotMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let api_key = headers
        .get(BOT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::unauthorized("missing bot key"))?;

    let view = run_blocking(&state.service, move |svc| {
        svc.send_bot_message(&api_key, &req.channel_id, &req.content)
    })
    .await?;

    let event = ServerEvent::NewMessage {
        message: view.clone(),
    };
    let delivered = state
        .dispatcher
        .broadcast_to_channel(&view.message.channel_id, &event, None)
        .await;
    debug!(message_id = %view.message.id, delivered, "Bot message fanned out");

    Ok((StatusCode::CREATED, Json(view)))
}
