use axum::{extract::rejection::JsonRejection, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{json_error, AppState};
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct DeleteFile {
    #[serde(default)]
    pub filename: String,
}

pub async fn list_files(Extension(state): Extension<Arc<AppState>>) -> Result<Json<Value>> {
    let files = state.attachments.list().await?;
    Ok(Json(json!({ "success": true, "files": files })))
}

pub async fn delete_file(
    Extension(state): Extension<Arc<AppState>>,
    payload: std::result::Result<Json<DeleteFile>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(payload) = payload.map_err(json_error)?;
    let filename = payload.filename.trim();
    if filename.is_empty() {
        return Err(AppError::InvalidRequest("Filename is required".into()));
    }
    state.attachments.delete(filename).await?;
    Ok(Json(json!({ "success": true, "message": format!("Deleted {}", filename) })))
}
