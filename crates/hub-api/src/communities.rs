use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use hub_gateway::run_blocking;
use hub_types::api::{AddEmojiRequest, Claims, CreateChannelRequest, CreateCommunityRequest, SearchQuery};
use hub_types::models::ChannelKind;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::author;

/// Public directory; no session needed.
pub async fn list_public_communities(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let communities = run_blocking(&state.service, |svc| svc.list_public_communities()).await?;
    Ok(Json(communities))
}

pub async fn list_my_communities(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let communities =
        run_blocking(&state.service, move |svc| svc.list_user_communities(&claims.sub)).await?;
    Ok(Json(communities))
}

pub async fn create_community(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommunityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = author(&claims);
    let community = run_blocking(&state.service, move |svc| {
        svc.create_community(&owner, &req.name, req.description.as_deref(), req.is_public)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(community)))
}

pub async fn get_community(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let community = run_blocking(&state.service, move |svc| svc.get_community(&community_id)).await?;
    Ok(Json(community))
}

pub async fn join_community(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = author(&claims);
    let member =
        run_blocking(&state.service, move |svc| svc.join_community(&community_id, &user)).await?;
    Ok(Json(member))
}

pub async fn leave_community(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state.service, move |svc| {
        svc.leave_community(&community_id, &claims.sub)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_channels(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let channels = run_blocking(&state.service, move |svc| svc.list_channels(&community_id)).await?;
    Ok(Json(channels))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let kind = req.kind.unwrap_or(ChannelKind::Chat);
    let channel = run_blocking(&state.service, move |svc| {
        svc.create_channel(&community_id, &actor, &req.name, kind)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let members = run_blocking(&state.service, move |svc| svc.list_members(&community_id)).await?;
    Ok(Json(members))
}

pub async fn search_community(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let hits = run_blocking(&state.service, move |svc| {
        svc.search_community_messages(&community_id, &query.q)
    })
    .await?;
    Ok(Json(hits))
}

pub async fn list_emojis(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let emojis =
        run_blocking(&state.service, move |svc| svc.list_custom_emojis(&community_id)).await?;
    Ok(Json(emojis))
}

pub async fn add_emoji(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddEmojiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let emoji = run_blocking(&state.service, move |svc| {
        svc.add_custom_emoji(&community_id, &actor, &req.name, &req.url)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(emoji)))
}
