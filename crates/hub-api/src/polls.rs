use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use hub_gateway::run_blocking;
use hub_types::api::{Claims, CreatePollRequest, VoteRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::author;

pub async fn list_polls(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let polls = run_blocking(&state.service, move |svc| svc.list_polls(&channel_id)).await?;
    Ok(Json(polls))
}

pub async fn create_poll(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = author(&claims);
    let poll = run_blocking(&state.service, move |svc| {
        svc.create_poll(
            &channel_id,
            &actor,
            &req.question,
            &req.options,
            req.allow_multiple,
            req.ends_at,
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

pub async fn get_poll_results(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let results = run_blocking(&state.service, move |svc| svc.get_poll_results(&poll_id)).await?;
    Ok(Json(results))
}

pub async fn vote(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let results = run_blocking(&state.service, move |svc| {
        svc.vote_poll(&poll_id, &claims.sub, req.option_index)
    })
    .await?;
    Ok(Json(results))
}
