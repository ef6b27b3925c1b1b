use axum::{extract::rejection::JsonRejection, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{json_error, AppState};
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct SubjectPayload {
    #[serde(default)]
    pub subject: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub message: String,
}

type Payload<T> = std::result::Result<Json<T>, JsonRejection>;

pub async fn list_subjects(Extension(state): Extension<Arc<AppState>>) -> Result<Json<Value>> {
    let subjects = state.subjects.list().await?;
    Ok(Json(json!({ "success": true, "subjects": subjects })))
}

pub async fn add_subject(
    Extension(state): Extension<Arc<AppState>>,
    payload: Payload<SubjectPayload>,
) -> Result<Json<Value>> {
    let Json(payload) = payload.map_err(json_error)?;
    state.subjects.add(&payload.subject).await?;
    Ok(Json(json!({ "success": true, "message": "Subject saved" })))
}

pub async fn delete_subject(
    Extension(state): Extension<Arc<AppState>>,
    payload: Payload<SubjectPayload>,
) -> Result<Json<Value>> {
    let Json(payload) = payload.map_err(json_error)?;
    state.subjects.delete(&payload.subject).await?;
    Ok(Json(json!({ "success": true, "message": "Subject deleted" })))
}

pub async fn list_messages(Extension(state): Extension<Arc<AppState>>) -> Result<Json<Value>> {
    let messages = state.messages.list().await?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}

pub async fn add_message(
    Extension(state): Extension<Arc<AppState>>,
    payload: Payload<MessagePayload>,
) -> Result<Json<Value>> {
    let Json(payload) = payload.map_err(json_error)?;
    state.messages.add(&payload.message).await?;
    Ok(Json(json!({ "success": true, "message": "Message saved" })))
}

pub async fn delete_message(
    Extension(state): Extension<Arc<AppState>>,
    payload: Payload<MessagePayload>,
) -> Result<Json<Value>> {
    let Json(payload) = payload.map_err(json_error)?;
    state.messages.delete(&payload.message).await?;
    Ok(Json(json!({ "success": true, "message": "Message deleted" })))
}
