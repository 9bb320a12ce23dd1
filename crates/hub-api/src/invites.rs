use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use hub_gateway::run_blocking;
use hub_types::api::{Claims, CreateInviteRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::author;

pub async fn list_invites(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let invites =
        run_blocking(&state.service, move |svc| svc.list_invites(&community_id, &actor)).await?;
    Ok(Json(invites))
}

pub async fn create_invite(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateInviteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let invite = run_blocking(&state.service, move |svc| {
        svc.create_invite(&community_id, &actor, req.max_uses, req.expires_at)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

pub async fn redeem_invite(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = author(&claims);
    let member = run_blocking(&state.service, move |svc| svc.redeem_invite(&code, &user)).await?;
    Ok(Json(member))
}

pub async fn revoke_invite(
    State(state): State<AppState>,
    Path(invite_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    run_blocking(&state.service, move |svc| svc.revoke_invite(&invite_id, &actor)).await?;
    Ok(StatusCode::NO_CONTENT)
}
