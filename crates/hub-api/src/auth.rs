use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use hub_gateway::connection::GatewayContext;
use hub_gateway::dispatcher::Dispatcher;
use hub_service::MessageService;
use hub_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: MessageService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub require_session: bool,
}

impl AppStateInner {
    pub fn gateway_context(&self) -> GatewayContext {
        GatewayContext {
            service: self.service.clone(),
            dispatcher: self.dispatcher.clone(),
            jwt_secret: self.jwt_secret.clone(),
            require_session: self.require_session,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if username.chars().count() < 3 || username.chars().count() > 32 {
        return Err(ApiError::bad_request("username must be 3-32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    // argon2 runs on the blocking pool
    let svc = state.service.clone();
    let user_id = Uuid::new_v4().to_string();
    let uid = user_id.clone();
    let name = username.clone();
    let created = tokio::task::spawn_blocking(move || -> Result<bool, ApiError> {
        if svc.db().get_user_by_username(&name)?.is_some() {
            return Ok(false);
        }
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| ApiError::internal(format!("password hash failed: {e}")))?
            .to_string();
        svc.db().create_user(&uid, &name, &password_hash)?;
        Ok(true)
    })
    .await
    .map_err(join_error)??;

    if !created {
        return Err(ApiError::conflict("username already taken"));
    }

    let token = create_token(&state.jwt_secret, &user_id, &username)?;
    info!(%user_id, %username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let svc = state.service.clone();
    let user = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let user = svc
            .db()
            .get_user_by_username(&req.username)?
            .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| ApiError::internal(format!("stored hash unreadable: {e}")))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::unauthorized("invalid credentials"))?;
        Ok(user)
    })
    .await
    .map_err(join_error)??;

    let token = create_token(&state.jwt_secret, &user.id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::internal("internal error")
}

pub fn create_token(secret: &str, user_id: &str, username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("token encode failed: {e}")))
}
