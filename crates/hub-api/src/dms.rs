use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use hub_gateway::run_blocking;
use hub_types::api::{Claims, DirectMessageRequest, OpenDmRequest};

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct DmQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations =
        run_blocking(&state.service, move |svc| svc.list_dm_conversations(&claims.sub)).await?;
    Ok(Json(conversations))
}

pub async fn open_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenDmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = run_blocking(&state.service, move |svc| {
        svc.get_or_create_dm_conversation(&claims.sub, &req.user_id)
    })
    .await?;
    Ok(Json(conversation))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<DmQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = run_blocking(&state.service, move |svc| {
        svc.list_direct_messages(&conversation_id, &claims.sub, query.limit)
    })
    .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DirectMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state.service, move |svc| {
        svc.send_direct_message(&conversation_id, &claims.sub, &req.content)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
