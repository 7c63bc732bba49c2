use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{IngredientAmount, RecipeIngredient};
use crate::error::{ApiError, ApiResult};
use crate::pagination::Pagination;
use crate::tags::repo_types::Tag;
use crate::users::dto::UserOut;

/// Compact form used by list toggles and subscription previews.
#[derive(Debug, Clone, Serialize)]
pub struct ShortRecipe {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

#[derive(Debug, Serialize)]
pub struct RecipeOut {
    pub id: i64,
    pub tags: Vec<Tag>,
    pub author: UserOut,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Body of POST and PUT. `image` is a base64 data URL, optional on PUT.
#[derive(Debug, Deserialize)]
pub struct RecipeWriteRequest {
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<i64>,
    pub image: Option<String>,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipePatchRequest {
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<i64>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}

impl From<RecipeWriteRequest> for RecipePatchRequest {
    fn from(r: RecipeWriteRequest) -> Self {
        Self {
            ingredients: Some(r.ingredients),
            tags: Some(r.tags),
            image: r.image,
            name: Some(r.name),
            text: Some(r.text),
            cooking_time: Some(r.cooking_time),
        }
    }
}

/// Query string of the recipe list. `tags` may repeat.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub author: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_favorited: Option<String>,
    pub is_in_shopping_cart: Option<String>,
}

impl RecipeQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// Accepts `1`/`0` and `true`/`false`.
pub fn parse_flag(name: &str, raw: Option<&str>) -> ApiResult<Option<bool>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some("1") | Some("true") | Some("True") => Ok(Some(true)),
        Some("0") | Some("false") | Some("False") => Ok(Some(false)),
        Some(other) => Err(ApiError::validation(format!(
            "{name} must be 0 or 1, got '{other}'"
        ))),
    }
}
