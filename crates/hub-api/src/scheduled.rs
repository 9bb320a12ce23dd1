use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use hub_gateway::run_blocking;
use hub_types::api::{Claims, ScheduleMessageRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::author;

pub async fn schedule_message(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ScheduleMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let scheduled = run_blocking(&state.service, move |svc| {
        svc.schedule_message(&channel_id, &actor, &req.content, req.scheduled_for)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(scheduled)))
}

pub async fn list_scheduled(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pending =
        run_blocking(&state.service, move |svc| svc.list_scheduled_messages(&claims.sub)).await?;
    Ok(Json(pending))
}

pub async fn cancel_scheduled(
    State(state): State<AppState>,
    Path(scheduled_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let cancelled = run_blocking(&state.service, move |svc| {
        svc.cancel_scheduled_message(&scheduled_id, &claims.sub)
    })
    .await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}
