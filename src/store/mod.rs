//! Repository interfaces, one per entity, plus the Postgres implementation.
//!
//! Uniqueness and referential integrity are enforced by the backing store and
//! surface as [`RepoError::Conflict`] / [`RepoError::MissingReference`].

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::ingredients::repo_types::{Ingredient, NewIngredient};
use crate::recipes::repo_types::{
    IngredientTotal, Recipe, RecipeChanges, RecipeDraft, RecipeFilter, RecipeList,
};
use crate::tags::repo_types::{NewTag, Tag};
use crate::users::repo_types::{NewUser, Role, User};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    MissingReference(String),

    #[error("{0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let sqlx::Error::Database(db) = &e {
            let constraint = db.constraint().unwrap_or("unknown").to_string();
            match db.kind() {
                ErrorKind::UniqueViolation => {
                    return RepoError::Conflict(conflict_message(&constraint));
                }
                ErrorKind::ForeignKeyViolation => {
                    return RepoError::MissingReference(format!(
                        "referenced object does not exist ({constraint})"
                    ));
                }
                ErrorKind::CheckViolation => {
                    return RepoError::Invalid(format!("value rejected by {constraint}"));
                }
                _ => {}
            }
        }
        RepoError::Database(e)
    }
}

fn conflict_message(constraint: &str) -> String {
    match constraint {
        "users_email_key" => "A user with this email already exists".into(),
        "users_username_key" => "A user with this username already exists".into(),
        "tags_slug_key" => "A tag with this slug already exists".into(),
        "tags_color_key" => "A tag with this color already exists".into(),
        other => format!("duplicate value violates {other}"),
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self, limit: i64, offset: i64) -> RepoResult<(Vec<User>, i64)>;
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> RepoResult<()>;
    /// Returns `false` when no user has that email.
    async fn set_role(&self, email: &str, role: Role) -> RepoResult<bool>;
}

#[async_trait]
pub trait TagRepo: Send + Sync {
    async fn list_tags(&self) -> RepoResult<Vec<Tag>>;
    async fn find_tag(&self, id: i64) -> RepoResult<Option<Tag>>;
    async fn create_tag(&self, new: NewTag) -> RepoResult<Tag>;
}

#[async_trait]
pub trait IngredientRepo: Send + Sync {
    /// Case-insensitive prefix search when `name_prefix` is set.
    async fn list_ingredients(&self, name_prefix: Option<&str>) -> RepoResult<Vec<Ingredient>>;
    async fn find_ingredient(&self, id: i64) -> RepoResult<Option<Ingredient>>;
    /// Inserts rows whose `(name, unit)` pair is new; returns how many were added.
    async fn insert_ingredients(&self, rows: &[NewIngredient]) -> RepoResult<u64>;
}

#[async_trait]
pub trait RecipeRepo: Send + Sync {
    /// Creates the recipe with its ingredient lines and tags atomically.
    async fn create_recipe(&self, author: Uuid, draft: RecipeDraft) -> RepoResult<i64>;
    /// Applies `changes` atomically. Returns `false` when the recipe is gone.
    async fn update_recipe(&self, id: i64, changes: RecipeChanges) -> RepoResult<bool>;
    async fn delete_recipe(&self, id: i64) -> RepoResult<bool>;
    async fn find_recipe(&self, id: i64) -> RepoResult<Option<Recipe>>;
    /// Newest first.
    async fn list_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> RepoResult<(Vec<Recipe>, i64)>;
    /// Newest first, at most `limit` when set, plus the author's total.
    async fn recipes_by_author(
        &self,
        author: Uuid,
        limit: Option<i64>,
    ) -> RepoResult<(Vec<Recipe>, i64)>;
}

#[async_trait]
pub trait MembershipRepo: Send + Sync {
    /// Returns `true` when a row was inserted, `false` when it already existed.
    async fn add_to_list(&self, list: RecipeList, user: Uuid, recipe: i64) -> RepoResult<bool>;
    /// Returns `false` when there was nothing to remove.
    async fn remove_from_list(&self, list: RecipeList, user: Uuid, recipe: i64)
        -> RepoResult<bool>;
    async fn in_list(&self, list: RecipeList, user: Uuid, recipe: i64) -> RepoResult<bool>;
    /// Amounts of every ingredient in the user's cart, grouped by `(name, unit)`
    /// and ordered by name.
    async fn cart_ingredient_totals(&self, user: Uuid) -> RepoResult<Vec<IngredientTotal>>;
}

#[async_trait]
pub trait FollowRepo: Send + Sync {
    /// Returns `true` when a row was inserted, `false` when it already existed.
    async fn follow(&self, user: Uuid, author: Uuid) -> RepoResult<bool>;
    async fn unfollow(&self, user: Uuid, author: Uuid) -> RepoResult<bool>;
    async fn is_following(&self, user: Uuid, author: Uuid) -> RepoResult<bool>;
    async fn list_followed(&self, user: Uuid, limit: i64, offset: i64)
        -> RepoResult<(Vec<User>, i64)>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Repository:
    UserRepo + TagRepo + IngredientRepo + RecipeRepo + MembershipRepo + FollowRepo
{
}

impl<T> Repository for T where
    T: UserRepo + TagRepo + IngredientRepo + RecipeRepo + MembershipRepo + FollowRepo
{
}
