use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;
use uuid::Uuid;

use super::dto::{AuthorWithRecipes, UserOut};
use super::repo_types::User;
use crate::error::{ApiError, ApiResult};
use crate::recipes::services::short_recipe;
use crate::state::AppState;

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Letters, digits and `@ . + - _`, at most 150 characters.
pub fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]{1,150}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Loads the authenticated caller; a token for a deleted account is a 401.
pub async fn require_user(state: &AppState, user_id: Uuid) -> ApiResult<User> {
    state
        .repo
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))
}

pub async fn require_admin(state: &AppState, user_id: Uuid) -> ApiResult<User> {
    let user = require_user(state, user_id).await?;
    if !user.is_admin() {
        warn!(%user_id, "admin action denied");
        return Err(ApiError::forbidden());
    }
    Ok(user)
}

pub async fn is_subscribed(state: &AppState, viewer: Option<Uuid>, author: Uuid) -> ApiResult<bool> {
    match viewer {
        Some(v) if v != author => Ok(state.repo.is_following(v, author).await?),
        _ => Ok(false),
    }
}

pub async fn user_out(state: &AppState, viewer: Option<Uuid>, user: User) -> ApiResult<UserOut> {
    let subscribed = is_subscribed(state, viewer, user.id).await?;
    Ok(UserOut::new(user, subscribed))
}

pub async fn author_with_recipes(
    state: &AppState,
    viewer: Option<Uuid>,
    author: User,
    recipes_limit: i64,
) -> ApiResult<AuthorWithRecipes> {
    let (recipes, recipes_count) = state
        .repo
        .recipes_by_author(author.id, Some(recipes_limit))
        .await?;
    let mut previews = Vec::with_capacity(recipes.len());
    for r in &recipes {
        previews.push(short_recipe(state, r).await?);
    }
    Ok(AuthorWithRecipes {
        user: user_out(state, viewer, author).await?,
        recipes: previews,
        recipes_count,
    })
}
