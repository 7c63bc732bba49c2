use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::{dto::CreateTagRequest, repo_types::Tag};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, ApiResult},
    extract::{JsonBody, PathParam},
    state::AppState,
    users::services::require_admin,
};

pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/tags/", get(list_tags).post(create_tag))
        .route("/tags/:id/", get(get_tag))
}

#[instrument(skip(state))]
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.repo.list_tags().await?))
}

#[instrument(skip(state))]
pub async fn get_tag(State(state): State<AppState>, PathParam(id): PathParam<i64>) -> ApiResult<Json<Tag>> {
    state
        .repo
        .find_tag(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Tag"))
}

#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<CreateTagRequest>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    require_admin(&state, user_id).await?;
    let tag = state.repo.create_tag(payload.into_new_tag()?).await?;
    info!(tag_id = tag.id, slug = %tag.slug, "tag created");
    Ok((StatusCode::CREATED, Json(tag)))
}
