pub mod encryption;
pub mod outbox;
pub mod smtp;

use log::{info, warn};
use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::mail_composer::{AttachmentOrigin, OutboundMessage};
use crate::settings::{CredentialsConfig, MailConfig, TransportConfig};
use outbox::OutboxSender;
use smtp::SmtpSender;

pub enum Transport {
    Smtp(SmtpSender),
    /// Raw-message transport: base64url envelopes dropped into a directory.
    Outbox(OutboxSender),
}

pub struct MailSender {
    from_address: String,
    default_sender_name: Option<String>,
    timeout: Duration,
    transport: Transport,
}

impl MailSender {
    pub fn new(
        from_address: String,
        default_sender_name: Option<String>,
        timeout: Duration,
        transport: Transport,
    ) -> Self {
        MailSender {
            from_address,
            default_sender_name,
            timeout,
            transport,
        }
    }

    pub fn from_config(mail: &MailConfig, credentials: &CredentialsConfig) -> Self {
        let transport = match &mail.transport {
            TransportConfig::Smtp(smtp) => Transport::Smtp(SmtpSender::new(
                smtp.clone(),
                credentials.clone(),
                mail.timeout(),
            )),
            TransportConfig::Outbox { dir } => Transport::Outbox(OutboxSender::new(dir)),
        };
        MailSender::new(
            mail.from_address.clone(),
            mail.sender_name.clone(),
            mail.timeout(),
            transport,
        )
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let sender_name = message
            .sender_name
            .as_deref()
            .or(self.default_sender_name.as_deref());
        let from = self.from_address.as_str();

        let delivery = async {
            match &self.transport {
                Transport::Smtp(smtp) => smtp.send(message, from, sender_name).await,
                Transport::Outbox(outbox) => outbox.send(message, from, sender_name).await.map(|_| ()),
            }
        };
        let result = bounded(self.timeout, delivery).await;
        match &result {
            Ok(()) => {
                let uploaded = message
                    .attachments
                    .iter()
                    .filter(|a| a.origin == AttachmentOrigin::Uploaded)
                    .count();
                info!(
                    "Sent message to {} recipient(s) with {} new and {} saved attachment(s)",
                    message.recipients.len(),
                    uploaded,
                    message.attachments.len() - uploaded
                )
            }
            Err(e) => warn!("Send failed: {}", e),
        }
        result
    }
}

/// Runs `delivery`, giving up after `timeout`.
pub(crate) async fn bounded<F>(timeout: Duration, delivery: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match tokio::time::timeout(timeout, delivery).await {
        Ok(result) => result,
        Err(_) => Err(AppError::TransportTimeout(timeout)),
    }
}
