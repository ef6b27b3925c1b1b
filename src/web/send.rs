use axum::{
    extract::multipart::{Field, Multipart, MultipartError, MultipartRejection},
    http::StatusCode,
    Extension, Json,
};
use log::debug;
use serde_json::{json, Value};
use std::sync::Arc;

use super::AppState;
use crate::error::{AppError, Result};
use crate::mail_composer::{compose, SendRequest};
use crate::upload_intake::UploadIntake;

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::InvalidRequest(e.body_text())
    }
}

async fn read_file(field: &mut Field<'_>, intake: &UploadIntake, filename: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        intake.check_size(filename, bytes.len() + chunk.len())?;
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Accepts repeated fields as well as a JSON array string.
fn push_selected(selected: &mut Vec<String>, value: &str) -> Result<()> {
    let value = value.trim();
    if value.starts_with('[') {
        let names: Vec<String> = serde_json::from_str(value)
            .map_err(|e| AppError::InvalidRequest(format!("selectedFiles: {}", e)))?;
        selected.extend(names.into_iter().filter(|n| !n.trim().is_empty()));
    } else if !value.is_empty() {
        selected.push(value.to_string());
    }
    Ok(())
}

/// Reads the form, staging uploads into `request` as they arrive so the
/// caller can discard them if reading fails half-way.
async fn read_form(
    intake: &UploadIntake,
    mut multipart: Multipart,
    request: &mut SendRequest,
) -> Result<()> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "attachments" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = read_file(&mut field, intake, &filename).await?;
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                intake.check_count(request.uploads.len() + 1)?;
                let staged = intake.stage(&filename, &bytes).await?;
                debug!("Staged {} ({} bytes)", staged.original_name, staged.size);
                request.uploads.push(staged);
            }
            "recipient" => request.recipient = field.text().await.map_err(multipart_error)?,
            "subject" => request.subject = field.text().await.map_err(multipart_error)?,
            "body" => request.body = field.text().await.map_err(multipart_error)?,
            "senderName" => {
                request.sender_name = Some(field.text().await.map_err(multipart_error)?)
            }
            "selectedFiles" => {
                let value = field.text().await.map_err(multipart_error)?;
                push_selected(&mut request.selected_files, &value)?;
            }
            other => debug!("Ignoring form field {}", other),
        }
    }
    Ok(())
}

pub async fn send_email(
    Extension(state): Extension<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>> {
    let multipart = multipart.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let mut request = SendRequest::default();
    if let Err(e) = read_form(&state.intake, multipart, &mut request).await {
        state.intake.discard_all(&request.uploads).await;
        return Err(e);
    }

    let staged = request.uploads.clone();
    let composition = match compose(request, &state.attachments, &state.renderer).await {
        Ok(composition) => composition,
        Err(e) => {
            state.intake.discard_all(&staged).await;
            return Err(e);
        }
    };

    if let Err(e) = state.sender.send(&composition.message).await {
        state.intake.discard_all(&composition.to_promote).await;
        return Err(e);
    }
    state
        .intake
        .promote_all(&composition.to_promote, &state.attachments)
        .await;

    Ok(Json(json!({ "success": true, "message": "Email sent successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_files_accept_json_and_plain_values() {
        let mut selected = Vec::new();
        push_selected(&mut selected, r#"["a.pdf", "", "b.png"]"#).unwrap();
        push_selected(&mut selected, " c.txt ").unwrap();
        push_selected(&mut selected, "").unwrap();
        assert_eq!(selected, vec!["a.pdf", "b.png", "c.txt"]);

        assert!(push_selected(&mut selected, "[not json").is_err());
    }
}
