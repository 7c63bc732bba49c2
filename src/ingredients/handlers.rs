use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::repo_types::Ingredient;
use crate::{
    error::{ApiError, ApiResult},
    extract::{PathParam, QueryParams},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct IngredientSearch {
    pub name: Option<String>,
}

pub fn ingredient_routes() -> Router<AppState> {
    Router::new()
        .route("/ingredients/", get(list_ingredients))
        .route("/ingredients/:id/", get(get_ingredient))
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<IngredientSearch>,
) -> ApiResult<Json<Vec<Ingredient>>> {
    let prefix = q.name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    Ok(Json(state.repo.list_ingredients(prefix).await?))
}

#[instrument(skip(state))]
pub async fn get_ingredient(
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Json<Ingredient>> {
    state
        .repo
        .find_ingredient(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Ingredient"))
}
