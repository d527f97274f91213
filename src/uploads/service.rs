use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Upload cap, enforced here and (slightly padded) at the body-limit layer.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const URL_TTL_SECS: u64 = 60 * 60;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
}

fn ext_for_image(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Size and content-type gate. Returns the file extension for the object key.
fn validate_image(content_type: &str, len: usize) -> Result<&'static str, AppError> {
    if len == 0 {
        return Err(AppError::validation("uploaded file is empty"));
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(AppError::validation("image exceeds the 5MB limit"));
    }
    ext_for_image(content_type).ok_or_else(|| {
        AppError::validation("content type must be one of image/jpeg, image/png, image/gif, image/webp")
    })
}

/// Store the image and hand back an opaque key plus a retrievable URL.
pub async fn store_image(
    state: &AppState,
    body: Bytes,
    content_type: &str,
) -> Result<UploadResponse, AppError> {
    let ext = validate_image(content_type, body.len())?;
    let key = format!("uploads/{}.{}", Uuid::new_v4(), ext);

    state.storage.put_object(&key, body, content_type).await?;
    let url = state.storage.presign_get(&key, URL_TTL_SECS).await?;

    Ok(UploadResponse { key, url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_allowed_image_types_to_extensions() {
        assert_eq!(ext_for_image("image/jpeg"), Some("jpg"));
        assert_eq!(ext_for_image("image/jpg"), Some("jpg"));
        assert_eq!(ext_for_image("image/png"), Some("png"));
        assert_eq!(ext_for_image("image/gif"), Some("gif"));
        assert_eq!(ext_for_image("image/webp"), Some("webp"));
        assert_eq!(ext_for_image("image/heic"), None);
        assert_eq!(ext_for_image("application/pdf"), None);
    }

    #[test]
    fn rejects_oversized_and_empty_bodies() {
        assert!(validate_image("image/png", 0).is_err());
        assert!(validate_image("image/png", MAX_UPLOAD_BYTES + 1).is_err());
        assert!(validate_image("image/png", MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn rejects_non_image_content_types() {
        let err = validate_image("application/pdf", 1024).unwrap_err();
        assert!(err.to_string().contains("content type"));
    }
}
