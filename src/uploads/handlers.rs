use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::jwt::Staff,
    error::AppError,
    state::AppState,
    uploads::service::{self, UploadResponse, MAX_UPLOAD_BYTES},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/uploads", post(upload_image))
        // Padded past the image cap so multipart framing never trips it first.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
}

/// POST /uploads (multipart, field `file`)
#[instrument(skip(state, _claims, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    Staff(_claims): Staff,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    while let Ok(Some(field)) = mp.next_field().await {
        let name = field.name().map(|s| s.to_string());
        if name.as_deref() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(format!("failed to read upload: {e}")))?;
            let stored = service::store_image(&state, data, &content_type).await?;
            return Ok((StatusCode::CREATED, Json(stored)));
        }
    }
    Err(AppError::validation("multipart field 'file' is required"))
}
