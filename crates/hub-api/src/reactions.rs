use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use hub_gateway::run_blocking;
use hub_types::api::Claims;
use hub_types::events::ServerEvent;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::author;

pub async fn add_reaction(
    State(state): State<AppState>,
    Path((message_id, emoji)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let mid = message_id.clone();
    let (channel_id, reactions) = run_blocking(&state.service, move |svc| {
        let message = svc.get_message(&mid)?;
        let reactions = svc.add_reaction(&mid, &actor, &emoji)?;
        Ok((message.channel_id, reactions))
    })
    .await?;

    let event = ServerEvent::ReactionUpdate {
        message_id,
        reactions: reactions.clone(),
    };
    state
        .dispatcher
        .broadcast_to_channel(&channel_id, &event, None)
        .await;

    Ok(Json(reactions))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Path((message_id, emoji)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let mid = message_id.clone();
    let (channel_id, reactions) = run_blocking(&state.service, move |svc| {
        let reactions = svc.remove_reaction(&mid, &claims.sub, &emoji)?;
        let channel_id = svc.db().get_message(&mid)?.map(|m| m.channel_id);
        Ok((channel_id, reactions))
    })
    .await?;

    // Nobody to tell when the message itself is gone
    if let Some(channel_id) = channel_id {
        let event = ServerEvent::ReactionUpdate {
            message_id,
            reactions: reactions.clone(),
        };
        state
            .dispatcher
            .broadcast_to_channel(&channel_id, &event, None)
            .await;
    }

    Ok(Json(reactions))
}
