use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AuthorWithRecipes, CreatedUser, RegisterRequest, SetPasswordRequest, SubscriptionQuery, UserOut},
    repo_types::NewUser,
    services::{author_with_recipes, is_valid_email, is_valid_username, require_user, user_out},
};
use crate::{
    auth::{
        extractors::{AuthUser, MaybeAuthUser},
        password::{hash_password, verify_password, MIN_PASSWORD_LEN},
    },
    error::{ApiError, ApiResult},
    extract::{JsonBody, PathParam, QueryParams},
    pagination::{Page, Pagination},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users).post(register))
        .route("/users/me/", get(get_me))
        .route("/users/set_password/", post(set_password))
        .route("/users/subscriptions/", get(subscriptions))
        .route("/users/:id/", get(get_user))
        .route("/users/:id/subscribe/", post(subscribe).delete(unsubscribe))
}

fn check_name_field(value: &str, field: &str) -> ApiResult<()> {
    if value.chars().count() > 150 {
        return Err(ApiError::validation(format!(
            "{field} must be at most 150 characters"
        )));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(mut payload): JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<CreatedUser>)> {
    payload.email = payload.email.trim().to_lowercase();
    payload.username = payload.username.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    if !is_valid_username(&payload.username) {
        warn!(username = %payload.username, "invalid username");
        return Err(ApiError::validation(
            "Username may contain only letters, digits and @/./+/-/_",
        ));
    }
    check_name_field(&payload.first_name, "first_name")?;
    check_name_field(&payload.last_name, "last_name")?;
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::validation("Password too short"));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .repo
        .create_user(NewUser {
            email: payload.email,
            username: payload.username,
            first_name: payload.first_name,
            last_name: payload.last_name,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    QueryParams(p): QueryParams<Pagination>,
) -> ApiResult<Json<Page<UserOut>>> {
    let (limit, offset) = p.window(state.config.page_size);
    let (users, count) = state.repo.list_users(limit, offset).await?;
    let mut results = Vec::with_capacity(users.len());
    for u in users {
        results.push(user_out(&state, viewer, u).await?);
    }
    Ok(Json(Page { count, results }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<UserOut>> {
    let user = state
        .repo
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user_out(&state, viewer, user).await?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<UserOut>> {
    let user = require_user(&state, user_id).await?;
    Ok(Json(UserOut::new(user, false)))
}

#[instrument(skip(state, payload))]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<SetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, user_id).await?;
    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(%user_id, "set_password wrong current password");
        return Err(ApiError::validation("Current password is incorrect"));
    }
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password too short"));
    }
    let hash = hash_password(&payload.new_password)?;
    state.repo.set_password_hash(user_id, &hash).await?;
    info!(%user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn subscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(author_id): PathParam<Uuid>,
    QueryParams(q): QueryParams<SubscriptionQuery>,
) -> ApiResult<(StatusCode, Json<AuthorWithRecipes>)> {
    if user_id == author_id {
        warn!(%user_id, "self-subscription rejected");
        return Err(ApiError::validation("You cannot subscribe to yourself"));
    }
    let author = state
        .repo
        .find_user(author_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let created = state.repo.follow(user_id, author_id).await?;
    let status = if created {
        info!(%user_id, %author_id, "subscribed");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let body = author_with_recipes(&state, Some(user_id), author, q.recipes_limit()).await?;
    Ok((status, Json(body)))
}

#[instrument(skip(state))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(author_id): PathParam<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.repo.unfollow(user_id, author_id).await? {
        return Err(ApiError::not_found("Subscription"));
    }
    info!(%user_id, %author_id, "unsubscribed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn subscriptions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    QueryParams(q): QueryParams<SubscriptionQuery>,
) -> ApiResult<Json<Page<AuthorWithRecipes>>> {
    let (limit, offset) = q.pagination().window(state.config.page_size);
    let (authors, count) = state.repo.list_followed(user_id, limit, offset).await?;
    let mut results = Vec::with_capacity(authors.len());
    for author in authors {
        results.push(author_with_recipes(&state, Some(user_id), author, q.recipes_limit()).await?);
    }
    Ok(Json(Page { count, results }))
}
