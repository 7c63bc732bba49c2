use tracing::{debug, warn};
use uuid::Uuid;

use super::dto::{RecipeOut, RecipePatchRequest, RecipeWriteRequest, ShortRecipe};
use super::repo_types::{Recipe, RecipeChanges, RecipeDraft, RecipeList};
use super::validation::{
    validate_cooking_time, validate_ingredients, validate_name, validate_recipe, validate_tags,
    validate_text,
};
use crate::error::{ApiError, ApiResult};
use crate::images::services::{decode_data_url, image_url, remove_image, upload_recipe_image};
use crate::state::AppState;
use crate::users::services::{require_user, user_out};

pub async fn short_recipe(state: &AppState, recipe: &Recipe) -> ApiResult<ShortRecipe> {
    Ok(ShortRecipe {
        id: recipe.id,
        name: recipe.name.clone(),
        image: image_url(state, &recipe.image).await?,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn recipe_out(
    state: &AppState,
    viewer: Option<Uuid>,
    recipe: Recipe,
) -> ApiResult<RecipeOut> {
    let author = state
        .repo
        .find_user(recipe.author_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Author"))?;
    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(v) => (
            state.repo.in_list(RecipeList::Favorites, v, recipe.id).await?,
            state.repo.in_list(RecipeList::ShoppingCart, v, recipe.id).await?,
        ),
        None => (false, false),
    };
    let image = image_url(state, &recipe.image).await?;
    Ok(RecipeOut {
        id: recipe.id,
        tags: recipe.tags,
        author: user_out(state, viewer, author).await?,
        ingredients: recipe.ingredients,
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name,
        image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn load_recipe(state: &AppState, id: i64) -> ApiResult<Recipe> {
    state
        .repo
        .find_recipe(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe"))
}

/// Only the author or an admin may change a recipe.
pub async fn ensure_can_edit(state: &AppState, user_id: Uuid, recipe: &Recipe) -> ApiResult<()> {
    if recipe.author_id == user_id {
        return Ok(());
    }
    let user = require_user(state, user_id).await?;
    if user.is_admin() {
        return Ok(());
    }
    warn!(%user_id, recipe_id = recipe.id, "recipe edit denied");
    Err(ApiError::forbidden())
}

/// Validates a create payload, uploads the image and returns the draft.
pub async fn prepare_draft(state: &AppState, req: RecipeWriteRequest) -> ApiResult<RecipeDraft> {
    validate_recipe(
        &req.ingredients,
        &req.tags,
        req.cooking_time,
        state.config.min_recipe_ingredients,
    )?;
    validate_name(&req.name)?;
    validate_text(&req.text)?;
    let data_url = req
        .image
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Image is required"))?;
    let item = decode_data_url(data_url)?;
    let image = upload_recipe_image(state, item).await?;

    Ok(RecipeDraft {
        name: req.name.trim().to_string(),
        text: req.text,
        image,
        cooking_time: req.cooking_time,
        tags: req.tags,
        ingredients: req.ingredients,
    })
}

/// Validates the present fields of an edit. A new image is uploaded last so a
/// rejected payload leaves storage untouched.
pub async fn prepare_changes(
    state: &AppState,
    req: RecipePatchRequest,
) -> ApiResult<RecipeChanges> {
    if let Some(ingredients) = &req.ingredients {
        validate_ingredients(ingredients, state.config.min_recipe_ingredients)?;
    }
    if let Some(tags) = &req.tags {
        validate_tags(tags)?;
    }
    if let Some(t) = req.cooking_time {
        validate_cooking_time(t)?;
    }
    if let Some(name) = &req.name {
        validate_name(name)?;
    }
    if let Some(text) = &req.text {
        validate_text(text)?;
    }
    let image = match req.image.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(data_url) => {
            let item = decode_data_url(data_url)?;
            Some(upload_recipe_image(state, item).await?)
        }
        None => None,
    };

    Ok(RecipeChanges {
        name: req.name.map(|n| n.trim().to_string()),
        text: req.text,
        image,
        cooking_time: req.cooking_time,
        tags: req.tags,
        ingredients: req.ingredients,
    })
}

/// Applies an edit; removes the previous image once the new one is stored.
pub async fn apply_changes(
    state: &AppState,
    recipe: &Recipe,
    changes: RecipeChanges,
) -> ApiResult<()> {
    let new_image = changes.image.clone();
    match state.repo.update_recipe(recipe.id, changes).await {
        Ok(true) => {}
        Ok(false) => {
            if let Some(key) = &new_image {
                remove_image(state, key).await;
            }
            return Err(ApiError::not_found("Recipe"));
        }
        Err(e) => {
            if let Some(key) = &new_image {
                remove_image(state, key).await;
            }
            return Err(e.into());
        }
    }
    if let Some(key) = new_image {
        debug!(recipe_id = recipe.id, %key, "recipe image replaced");
        remove_image(state, &recipe.image).await;
    }
    Ok(())
}
