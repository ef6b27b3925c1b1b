pub mod media_type;
pub mod mime;
pub mod render;

use std::path::PathBuf;

use lettre::Address;
use log::debug;
use tokio::fs;

use crate::error::{AppError, Result};
use crate::storage::AttachmentStore;
use crate::upload_intake::StagedUpload;
use media_type::media_type_for;
use render::BodyRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentOrigin {
    Uploaded,
    Saved,
}

/// One file of an outbound message; content is read only when sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingAttachment {
    pub filename: String,
    pub path: PathBuf,
    pub media_type: &'static str,
    pub origin: AttachmentOrigin,
}

impl OutgoingAttachment {
    pub async fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path)
            .await
            .map_err(|e| AppError::storage(&self.path, e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipients: Vec<String>,
    pub sender_name: Option<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub attachments: Vec<OutgoingAttachment>,
}

/// Everything a send request carries once uploads have been staged.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sender_name: Option<String>,
    pub uploads: Vec<StagedUpload>,
    pub selected_files: Vec<String>,
}

#[derive(Debug)]
pub struct Composition {
    pub message: OutboundMessage,
    /// Uploads to move into the attachment store once the send succeeded.
    pub to_promote: Vec<StagedUpload>,
}

fn parse_recipients(field: &str) -> Result<Vec<String>> {
    let mut recipients = Vec::new();
    for candidate in field.split([',', ';']).map(str::trim).filter(|s| !s.is_empty()) {
        candidate
            .parse::<Address>()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid recipient {}: {}", candidate, e)))?;
        recipients.push(candidate.to_string());
    }
    if recipients.is_empty() {
        return Err(AppError::InvalidRequest("Recipient is required".into()));
    }
    Ok(recipients)
}

/// Validates the request and builds the message. Uploads come first in
/// request order, followed by the selected saved files that still exist.
pub async fn compose(
    request: SendRequest,
    store: &AttachmentStore,
    renderer: &BodyRenderer,
) -> Result<Composition> {
    if request.recipient.trim().is_empty()
        || request.subject.trim().is_empty()
        || request.body.trim().is_empty()
    {
        return Err(AppError::InvalidRequest(
            "Recipient, subject and body are required".into(),
        ));
    }
    for (field, value) in [
        ("Subject", Some(request.subject.trim())),
        ("Sender name", request.sender_name.as_deref().map(str::trim)),
    ] {
        if value.is_some_and(|v| v.contains(['\r', '\n'])) {
            return Err(AppError::InvalidRequest(format!(
                "{} must be a single line",
                field
            )));
        }
    }
    let recipients = parse_recipients(&request.recipient)?;

    let mut attachments: Vec<OutgoingAttachment> = request
        .uploads
        .iter()
        .map(|upload| OutgoingAttachment {
            filename: upload.original_name.clone(),
            path: upload.path.clone(),
            media_type: media_type_for(&upload.original_name),
            origin: AttachmentOrigin::Uploaded,
        })
        .collect();

    for name in &request.selected_files {
        match store.resolve(name).await {
            Some(path) => attachments.push(OutgoingAttachment {
                filename: name.clone(),
                path,
                media_type: media_type_for(name),
                origin: AttachmentOrigin::Saved,
            }),
            None => debug!("Selected file {} is not in the store, skipping", name),
        }
    }

    let html_body = renderer.render_html(&request.body)?;
    let sender_name = request
        .sender_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    Ok(Composition {
        message: OutboundMessage {
            recipients,
            sender_name,
            subject: request.subject.trim().to_string(),
            text_body: request.body,
            html_body,
            attachments,
        },
        to_promote: request.uploads,
    })
}
