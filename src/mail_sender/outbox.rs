use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::error::{AppError, Result};
use crate::mail_composer::mime::{encode_base64url, MimeEnvelope};
use crate::mail_composer::OutboundMessage;

/// One queued message, shaped like a raw-message mail API request.
#[derive(Debug, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub raw: String,
    pub to: Vec<String>,
    pub subject: String,
}

/// Hands fully serialized envelopes to a pickup directory.
pub struct OutboxSender {
    dir: PathBuf,
}

impl OutboxSender {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        OutboxSender { dir: dir.into() }
    }

    pub async fn send(
        &self,
        message: &OutboundMessage,
        from_address: &str,
        sender_name: Option<&str>,
    ) -> Result<PathBuf> {
        let envelope = MimeEnvelope::build(message, from_address, sender_name).await?;
        let entry = OutboxEntry {
            raw: encode_base64url(envelope.to_raw().as_bytes()),
            to: message.recipients.clone(),
            subject: message.subject.clone(),
        };
        let json = serde_json::to_vec_pretty(&entry)
            .map_err(|e| AppError::Transport(e.to_string()))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Transport(format!("{}: {}", self.dir.display(), e)))?;
        let path = self.dir.join(format!(
            "{}-{:08x}.json",
            chrono::Utc::now().timestamp_millis(),
            rand::thread_rng().gen::<u32>()
        ));
        fs::write(&path, json)
            .await
            .map_err(|e| AppError::Transport(format!("{}: {}", path.display(), e)))?;

        info!(
            "Queued message for {} in outbox {}",
            envelope.header("To").unwrap_or_default(),
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    fn message() -> OutboundMessage {
        OutboundMessage {
            recipients: vec!["a@b.com".into()],
            sender_name: None,
            subject: "Hi".into(),
            text_body: "hello".into(),
            html_body: "<div>hello</div>".into(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn writes_base64url_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let outbox = OutboxSender::new(tmp.path().join("outbox"));
        let path = outbox.send(&message(), "me@example.com", None).await.unwrap();

        let entry: OutboxEntry = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(entry.to, vec!["a@b.com"]);
        assert!(!entry.raw.contains(['+', '/', '=']));
        let raw = String::from_utf8(URL_SAFE_NO_PAD.decode(&entry.raw).unwrap()).unwrap();
        assert!(raw.starts_with("From: me@example.com\r\nTo: a@b.com\r\nSubject: Hi\r\n"));
        assert!(raw.contains("<div>hello</div>"));
    }

    #[tokio::test]
    async fn unwritable_outbox_is_a_transport_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("outbox");
        std::fs::write(&blocker, "not a directory").unwrap();

        let outbox = OutboxSender::new(&blocker);
        assert!(matches!(
            outbox.send(&message(), "me@example.com", None).await,
            Err(AppError::Transport(_))
        ));
    }
}
