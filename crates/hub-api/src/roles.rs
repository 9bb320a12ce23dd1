use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use hub_gateway::run_blocking;
use hub_types::api::{AssignRoleRequest, Claims, CreateRoleRequest, PermissionsResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::author;

pub async fn list_roles(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let roles = run_blocking(&state.service, move |svc| svc.list_roles(&community_id)).await?;
    Ok(Json(roles))
}

pub async fn create_role(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let role = run_blocking(&state.service, move |svc| {
        svc.create_role(
            &community_id,
            &actor,
            &req.name,
            &req.permissions,
            req.color.as_deref(),
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn assign_role(
    State(state): State<AppState>,
    Path((community_id, user_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    run_blocking(&state.service, move |svc| {
        svc.assign_role(&community_id, &actor, &user_id, &req.role)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn member_permissions(
    State(state): State<AppState>,
    Path((community_id, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user_id.clone();
    let permissions = run_blocking(&state.service, move |svc| {
        svc.get_member_permissions(&community_id, &uid)
    })
    .await?;
    Ok(Json(PermissionsResponse {
        user_id,
        permissions,
    }))
}
