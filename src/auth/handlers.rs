use axum::{extract::State, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, RefreshRequest},
    password::verify_password,
    tokens::TokenKind,
};
use crate::{
    error::{ApiError, ApiResult},
    extract::JsonBody,
    state::AppState,
    users::repo_types::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token/login/", post(login))
        .route("/auth/token/refresh/", post(refresh))
}

fn bad_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".into())
}

fn respond(state: &AppState, user: User) -> ApiResult<Json<AuthResponse>> {
    let pair = state.tokens.issue_pair(user.id)?;
    Ok(Json(AuthResponse {
        access_token: pair.access,
        refresh_token: pair.refresh,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();
    let Some(user) = state.repo.find_user_by_email(&email).await? else {
        warn!(%email, "login for unknown email");
        return Err(bad_credentials());
    };
    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(bad_credentials());
    }
    info!(user_id = %user.id, "user logged in");
    respond(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let claims = state
        .tokens
        .decode(payload.refresh_token.trim(), TokenKind::Refresh)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    let user = state
        .repo
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    respond(&state, user)
}
