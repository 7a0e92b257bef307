//! Bill upload handler

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use serde::Serialize;
use tracing::info;

use crate::{AppError, AppState, AuthUser};
use spendcheck_core::storage::validate_upload;
use spendcheck_core::{Error, StorageBackend};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
}

/// POST /upload - Store the multipart `file` field and return its URL
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let storage = state
        .storage
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("File storage not configured"))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::bad_request("Invalid multipart body or file too large (max 10 MB)"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|_| AppError::bad_request("Invalid multipart body or file too large (max 10 MB)"))?;
        upload = Some((file_name, data));
        break;
    }

    let Some((file_name, data)) = upload.filter(|(_, data)| !data.is_empty()) else {
        return Err(AppError::bad_request("No file uploaded"));
    };
    validate_upload(&file_name, data.len())?;

    let url = storage
        .upload(&file_name, data.to_vec())
        .await
        .map_err(|e| match e {
            Error::InvalidData(msg) => AppError::bad_request(&msg),
            other => AppError::bad_gateway("Upload failed", other),
        })?;
    info!(user_id = %user.uid, file = %file_name, "File uploaded");

    Ok(Json(UploadResponse { success: true, url }))
}
