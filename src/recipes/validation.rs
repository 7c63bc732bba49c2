//! Recipe payload rules. Pure functions, independent of HTTP decoding; the
//! first violated rule is reported.

use std::collections::HashSet;

use thiserror::Error;

use super::repo_types::IngredientAmount;
use crate::error::ApiError;

pub const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e.0)
    }
}

fn fail<T>(msg: impl Into<String>) -> Result<T, ValidationError> {
    Err(ValidationError(msg.into()))
}

/// Full check for create/replace payloads, in rule order.
pub fn validate_recipe(
    ingredients: &[IngredientAmount],
    tags: &[i64],
    cooking_time: i32,
    min_ingredients: usize,
) -> Result<(), ValidationError> {
    if ingredients.is_empty() || tags.is_empty() {
        return fail("A recipe needs at least one ingredient and one tag");
    }
    validate_ingredients(ingredients, min_ingredients)?;
    validate_cooking_time(cooking_time)
}

pub fn validate_ingredients(
    ingredients: &[IngredientAmount],
    min_ingredients: usize,
) -> Result<(), ValidationError> {
    if ingredients.is_empty() {
        return fail("A recipe needs at least one ingredient");
    }
    if ingredients.len() < min_ingredients {
        return fail(format!(
            "A recipe needs at least {min_ingredients} ingredients"
        ));
    }
    if let Some(bad) = ingredients.iter().find(|i| i.amount <= 0) {
        return fail(format!(
            "Amount of ingredient {} must be greater than zero",
            bad.id
        ));
    }
    let mut seen = HashSet::with_capacity(ingredients.len());
    if let Some(dup) = ingredients.iter().find(|i| !seen.insert(i.id)) {
        return fail(format!("Ingredient {} is listed more than once", dup.id));
    }
    Ok(())
}

pub fn validate_tags(tags: &[i64]) -> Result<(), ValidationError> {
    if tags.is_empty() {
        return fail("A recipe needs at least one tag");
    }
    Ok(())
}

pub fn validate_cooking_time(cooking_time: i32) -> Result<(), ValidationError> {
    if cooking_time <= 0 {
        return fail("Cooking time must be greater than zero");
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return fail("Recipe name must not be empty");
    }
    if name.chars().count() > MAX_NAME_LEN {
        return fail(format!(
            "Recipe name must be at most {MAX_NAME_LEN} characters"
        ));
    }
    Ok(())
}

pub fn validate_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return fail("Recipe description must not be empty");
    }
    Ok(())
}
