use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Image decoded from a `data:<mime>;base64,<payload>` URL.
#[derive(Debug)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

pub fn decode_data_url(data_url: &str) -> Result<UploadItem, ApiError> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| ApiError::validation("Image must be a base64 data URL"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ApiError::validation("Image must be a base64 data URL"))?;
    let content_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| ApiError::validation("Image must be base64 encoded"))?;
    if ext_from_mime(content_type).is_none() {
        return Err(ApiError::validation(format!(
            "Unsupported image type '{content_type}'"
        )));
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| ApiError::validation("Image is not valid base64"))?;
    if bytes.is_empty() {
        return Err(ApiError::validation("Image is empty"));
    }
    Ok(UploadItem {
        body: Bytes::from(bytes),
        content_type: content_type.to_string(),
    })
}

/// Stores a recipe image and returns its object key.
pub async fn upload_recipe_image(st: &AppState, image: UploadItem) -> anyhow::Result<String> {
    let ext = ext_from_mime(&image.content_type).unwrap_or("bin");
    let key = format!("recipes/{}.{}", Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, image.body, &image.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    debug!(%key, "recipe image stored");
    Ok(key)
}

/// Best-effort removal; a leftover object is only logged.
pub async fn remove_image(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, %key, "failed to delete recipe image");
    }
}

pub async fn image_url(st: &AppState, key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(key, st.config.storage.url_ttl_secs)
        .await
        .with_context(|| format!("presign url for {}", key))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod image_tests {
    use super::*;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn decodes_png_data_url() {
        let item = decode_data_url("data:image/png;base64,aGVsbG8=").expect("decode");
        assert_eq!(item.content_type, "image/png");
        assert_eq!(&item.body[..], b"hello");
    }

    #[test]
    fn rejects_malformed_data_urls() {
        assert!(decode_data_url("aGVsbG8=").is_err());
        assert!(decode_data_url("data:image/png,plain").is_err());
        assert!(decode_data_url("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }

    #[tokio::test]
    async fn upload_then_presign() {
        let state = AppState::fake();
        let item = decode_data_url("data:image/jpeg;base64,aGVsbG8=").unwrap();
        let key = upload_recipe_image(&state, item).await.unwrap();
        assert!(key.starts_with("recipes/") && key.ends_with(".jpg"));

        let url = image_url(&state, &key).await.unwrap();
        assert!(url.contains(&key));
    }
}
