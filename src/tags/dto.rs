use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::error::ApiError;
use crate::tags::repo_types::NewTag;

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    pub slug: String,
}

fn default_color() -> String {
    "#ffffff".into()
}

impl CreateTagRequest {
    pub fn into_new_tag(self) -> Result<NewTag, ApiError> {
        lazy_static! {
            static ref COLOR_RE: Regex = Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
            static ref SLUG_RE: Regex = Regex::new(r"^[-a-zA-Z0-9_]+$").unwrap();
        }
        let name = self.name.trim().to_string();
        if name.is_empty() || name.chars().count() > 20 {
            return Err(ApiError::validation("Tag name must be 1 to 20 characters"));
        }
        if !COLOR_RE.is_match(&self.color) {
            return Err(ApiError::validation("Tag color must look like #rrggbb"));
        }
        if self.slug.len() > 20 || !SLUG_RE.is_match(&self.slug) {
            return Err(ApiError::validation(
                "Tag slug must be 1 to 20 letters, digits, '-' or '_'",
            ));
        }
        Ok(NewTag {
            name,
            color: self.color.to_lowercase(),
            slug: self.slug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, color: &str, slug: &str) -> CreateTagRequest {
        CreateTagRequest {
            name: name.into(),
            color: color.into(),
            slug: slug.into(),
        }
    }

    #[test]
    fn accepts_and_normalizes_color() {
        let tag = req("Breakfast", "#FFAA00", "breakfast").into_new_tag().unwrap();
        assert_eq!(tag.color, "#ffaa00");
    }

    #[test]
    fn rejects_bad_fields() {
        assert!(req("", "#ffffff", "x").into_new_tag().is_err());
        assert!(req("Lunch", "red", "lunch").into_new_tag().is_err());
        assert!(req("Lunch", "#ff0000", "lunch time").into_new_tag().is_err());
    }
}
