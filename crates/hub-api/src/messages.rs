use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use hub_gateway::run_blocking;
use hub_types::api::{
    Claims, EditMessageRequest, ForwardMessageRequest, MessageQuery, SearchQuery,
    SendMessageRequest, ThreadReplyRequest,
};
use hub_types::events::ServerEvent;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::author;

pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = run_blocking(&state.service, move |svc| {
        svc.list_messages(&channel_id, query.limit, query.before.as_deref())
    })
    .await?;
    Ok(Json(messages))
}

/// REST twin of the gateway `message` envelope; live subscribers see it too.
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = author(&claims);
    let view = run_blocking(&state.service, move |svc| {
        svc.send_message(
            &channel_id,
            &sender,
            &req.content,
            req.reply_to_id.as_deref(),
            req.attachment,
        )
    })
    .await?;

    let event = ServerEvent::NewMessage {
        message: view.clone(),
    };
    state
        .dispatcher
        .broadcast_to_channel(&view.message.channel_id, &event, None)
        .await;

    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state.service, move |svc| svc.get_message(&message_id)).await?;
    Ok(Json(message))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state.service, move |svc| {
        svc.edit_message(&message_id, &claims.sub, &req.content)
    })
    .await?;

    let event = ServerEvent::MessageEdited {
        message: message.clone(),
    };
    state
        .dispatcher
        .broadcast_to_channel(&message.channel_id, &event, None)
        .await;

    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state.service, move |svc| {
        svc.delete_message(&message_id, &claims.sub)
    })
    .await?;

    let event = ServerEvent::MessageDeleted {
        message_id: message.id.clone(),
    };
    state
        .dispatcher
        .broadcast_to_channel(&message.channel_id, &event, None)
        .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn search_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let hits =
        run_blocking(&state.service, move |svc| svc.search_messages(&channel_id, &query.q)).await?;
    Ok(Json(hits))
}

pub async fn forward_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ForwardMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let view = run_blocking(&state.service, move |svc| {
        svc.forward_message(&message_id, &req.target_channel_id, &actor)
    })
    .await?;

    let event = ServerEvent::NewMessage {
        message: view.clone(),
    };
    state
        .dispatcher
        .broadcast_to_channel(&view.message.channel_id, &event, None)
        .await;

    Ok((StatusCode::CREATED, Json(view)))
}

// -- Pins --

pub async fn list_pins(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let pins = run_blocking(&state.service, move |svc| svc.list_pinned_messages(&channel_id)).await?;
    Ok(Json(pins))
}

pub async fn pin_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let message = run_blocking(&state.service, move |svc| svc.pin_message(&message_id, &actor)).await?;
    Ok(Json(message))
}

pub async fn unpin_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    run_blocking(&state.service, move |svc| svc.unpin_message(&message_id, &actor)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Threads --

pub async fn create_thread(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let thread = run_blocking(&state.service, move |svc| svc.create_thread(&message_id, &actor)).await?;
    Ok(Json(thread))
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let thread = run_blocking(&state.service, move |svc| svc.get_thread(&message_id)).await?;
    Ok(Json(thread))
}

pub async fn list_thread_replies(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let replies =
        run_blocking(&state.service, move |svc| svc.list_thread_replies(&message_id)).await?;
    Ok(Json(replies))
}

/// Thread replies stay out of the channel timeline, so nothing is broadcast.
pub async fn add_thread_reply(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ThreadReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let (reply, _thread) = run_blocking(&state.service, move |svc| {
        svc.add_thread_reply(&message_id, &actor, &req.content)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(reply)))
}
