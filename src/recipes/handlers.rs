use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{parse_flag, RecipeOut, RecipePatchRequest, RecipeQuery, RecipeWriteRequest, ShortRecipe},
    repo_types::{RecipeFilter, RecipeList},
    services::{
        apply_changes, ensure_can_edit, load_recipe, prepare_changes, prepare_draft, recipe_out,
        short_recipe,
    },
    shopping_list,
    validation::validate_recipe,
};
use crate::{
    auth::extractors::{AuthUser, MaybeAuthUser},
    error::{ApiError, ApiResult},
    extract::{JsonBody, MultiQuery, PathParam},
    images::services::remove_image,
    pagination::Page,
    state::AppState,
};

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/", get(list_recipes).post(create_recipe))
        .route("/recipes/download_shopping_cart/", get(download_shopping_cart))
        .route(
            "/recipes/:id/",
            get(get_recipe)
                .put(replace_recipe)
                .patch(patch_recipe)
                .delete(delete_recipe),
        )
        .route(
            "/recipes/:id/favorite/",
            post(add_favorite).delete(remove_favorite),
        )
        .route(
            "/recipes/:id/shopping_cart/",
            post(add_to_cart).delete(remove_from_cart),
        )
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB, base64 images
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    MultiQuery(q): MultiQuery<RecipeQuery>,
) -> ApiResult<Json<Page<RecipeOut>>> {
    let (limit, offset) = q.pagination().window(state.config.page_size);
    let filter = RecipeFilter {
        author: q.author,
        tags: q.tags.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect(),
        is_favorited: parse_flag("is_favorited", q.is_favorited.as_deref())?,
        is_in_shopping_cart: parse_flag("is_in_shopping_cart", q.is_in_shopping_cart.as_deref())?,
        viewer,
    };
    let (recipes, count) = state.repo.list_recipes(&filter, limit, offset).await?;
    let mut results = Vec::with_capacity(recipes.len());
    for r in recipes {
        results.push(recipe_out(&state, viewer, r).await?);
    }
    Ok(Json(Page { count, results }))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Json<RecipeOut>> {
    let recipe = load_recipe(&state, id).await?;
    Ok(Json(recipe_out(&state, viewer, recipe).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<RecipeWriteRequest>,
) -> ApiResult<(StatusCode, Json<RecipeOut>)> {
    let draft = prepare_draft(&state, payload).await?;
    let image = draft.image.clone();
    let id = match state.repo.create_recipe(user_id, draft).await {
        Ok(id) => id,
        Err(e) => {
            remove_image(&state, &image).await;
            return Err(e.into());
        }
    };
    info!(recipe_id = id, %user_id, "recipe created");

    let recipe = load_recipe(&state, id).await?;
    Ok((StatusCode::CREATED, Json(recipe_out(&state, Some(user_id), recipe).await?)))
}

/// PUT carries a whole recipe, PATCH any subset of fields.
enum Edit {
    Replace(RecipeWriteRequest),
    Patch(RecipePatchRequest),
}

async fn edit_recipe(
    state: &AppState,
    user_id: Uuid,
    id: i64,
    edit: Edit,
) -> ApiResult<Json<RecipeOut>> {
    let recipe = load_recipe(state, id).await?;
    ensure_can_edit(state, user_id, &recipe).await?;
    let payload = match edit {
        Edit::Replace(req) => {
            validate_recipe(
                &req.ingredients,
                &req.tags,
                req.cooking_time,
                state.config.min_recipe_ingredients,
            )?;
            req.into()
        }
        Edit::Patch(req) => req,
    };
    let changes = prepare_changes(state, payload).await?;
    apply_changes(state, &recipe, changes).await?;
    info!(recipe_id = id, %user_id, "recipe updated");

    let recipe = load_recipe(state, id).await?;
    Ok(Json(recipe_out(state, Some(user_id), recipe).await?))
}

#[instrument(skip(state, payload))]
pub async fn replace_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<RecipeWriteRequest>,
) -> ApiResult<Json<RecipeOut>> {
    edit_recipe(&state, user_id, id, Edit::Replace(payload)).await
}

#[instrument(skip(state, payload))]
pub async fn patch_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<RecipePatchRequest>,
) -> ApiResult<Json<RecipeOut>> {
    edit_recipe(&state, user_id, id, Edit::Patch(payload)).await
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<i64>,
) -> ApiResult<StatusCode> {
    let recipe = load_recipe(&state, id).await?;
    ensure_can_edit(&state, user_id, &recipe).await?;
    if !state.repo.delete_recipe(id).await? {
        return Err(ApiError::not_found("Recipe"));
    }
    remove_image(&state, &recipe.image).await;
    info!(recipe_id = id, %user_id, "recipe deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn add_to_list(
    state: &AppState,
    list: RecipeList,
    user_id: Uuid,
    id: i64,
) -> ApiResult<(StatusCode, Json<ShortRecipe>)> {
    let recipe = load_recipe(state, id).await?;
    let created = state.repo.add_to_list(list, user_id, id).await?;
    let status = if created {
        info!(recipe_id = id, %user_id, list = list.label(), "recipe added");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(short_recipe(state, &recipe).await?)))
}

async fn remove_from_list(
    state: &AppState,
    list: RecipeList,
    user_id: Uuid,
    id: i64,
) -> ApiResult<StatusCode> {
    load_recipe(state, id).await?;
    if !state.repo.remove_from_list(list, user_id, id).await? {
        return Err(ApiError::NotFound(format!(
            "Recipe is not in your {}",
            list.label()
        )));
    }
    info!(recipe_id = id, %user_id, list = list.label(), "recipe removed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<i64>,
) -> ApiResult<(StatusCode, Json<ShortRecipe>)> {
    add_to_list(&state, RecipeList::Favorites, user_id, id).await
}

#[instrument(skip(state))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<i64>,
) -> ApiResult<StatusCode> {
    remove_from_list(&state, RecipeList::Favorites, user_id, id).await
}

#[instrument(skip(state))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<i64>,
) -> ApiResult<(StatusCode, Json<ShortRecipe>)> {
    add_to_list(&state, RecipeList::ShoppingCart, user_id, id).await
}

#[instrument(skip(state))]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<i64>,
) -> ApiResult<StatusCode> {
    remove_from_list(&state, RecipeList::ShoppingCart, user_id, id).await
}

#[instrument(skip(state))]
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<impl IntoResponse> {
    let totals = state.repo.cart_ingredient_totals(user_id).await?;
    let body = shopping_list::render(&totals);
    info!(%user_id, groups = totals.len(), "shopping list generated");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.config.shopping_list_filename
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
