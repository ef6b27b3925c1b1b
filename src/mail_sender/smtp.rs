use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;
use std::time::Duration;

use super::encryption;
use crate::error::{AppError, Result};
use crate::mail_composer::OutboundMessage;
use crate::settings::{CredentialsConfig, SmtpConfig, SmtpSecurity};

fn transport_error(e: impl std::fmt::Display) -> AppError {
    AppError::Transport(e.to_string())
}

pub struct SmtpSender {
    config: SmtpConfig,
    credentials: CredentialsConfig,
    timeout: Duration,
}

impl SmtpSender {
    pub fn new(config: SmtpConfig, credentials: CredentialsConfig, timeout: Duration) -> Self {
        SmtpSender {
            config,
            credentials,
            timeout,
        }
    }

    fn transport(&self, password: String) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = self.config.host.as_str();
        let builder = match self.config.security {
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).map_err(transport_error)?
            }
            SmtpSecurity::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(host).map_err(transport_error)?
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };
        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(self.config.username.clone(), password))
            .timeout(Some(self.timeout))
            .build())
    }

    /// Key and password files are read on the blocking pool.
    async fn password(&self) -> Result<String> {
        let credentials = self.credentials.clone();
        tokio::task::spawn_blocking(move || encryption::smtp_password(&credentials))
            .await
            .map_err(transport_error)?
            .map_err(transport_error)?
            .ok_or_else(|| AppError::Transport("no SMTP password configured".into()))
    }

    pub async fn send(
        &self,
        message: &OutboundMessage,
        from_address: &str,
        sender_name: Option<&str>,
    ) -> Result<()> {
        let password = self.password().await?;
        let email = build_message(message, from_address, sender_name).await?;

        self.transport(password)?
            .send(email)
            .await
            .map_err(transport_error)?;
        info!("Sent via SMTP relay {}", self.config.host);
        Ok(())
    }
}

/// `multipart/mixed` holding a text/HTML alternative and one part per attachment.
pub async fn build_message(
    message: &OutboundMessage,
    from_address: &str,
    sender_name: Option<&str>,
) -> Result<Message> {
    let from_address: Address = from_address.parse().map_err(transport_error)?;
    let mut builder = Message::builder()
        .from(Mailbox::new(sender_name.map(str::to_string), from_address))
        .subject(message.subject.clone());

    for recipient in &message.recipients {
        let address: Address = recipient
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid recipient {}: {}", recipient, e)))?;
        builder = builder.to(Mailbox::new(None, address));
    }

    let mut body = MultiPart::mixed().multipart(
        MultiPart::alternative()
            .singlepart(SinglePart::plain(message.text_body.clone()))
            .singlepart(SinglePart::html(message.html_body.clone())),
    );
    for attachment in &message.attachments {
        let content = attachment.read().await?;
        let content_type = ContentType::parse(attachment.media_type).map_err(transport_error)?;
        body = body.singlepart(Attachment::new(attachment.filename.clone()).body(content, content_type));
    }

    builder.multipart(body).map_err(transport_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail_composer::{AttachmentOrigin, OutgoingAttachment};
    use mailparse::{parse_mail, MailHeaderMap};

    #[tokio::test]
    async fn message_carries_alternative_body_and_attachments() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.4 fake").unwrap();

        let outbound = OutboundMessage {
            recipients: vec!["a@b.com".into()],
            sender_name: None,
            subject: "Hi".into(),
            text_body: "line1\nline2".into(),
            html_body: "<div>line1<br>line2</div>".into(),
            attachments: vec![OutgoingAttachment {
                filename: "report.pdf".into(),
                path,
                media_type: "application/pdf",
                origin: AttachmentOrigin::Uploaded,
            }],
        };

        let email = build_message(&outbound, "me@example.com", Some("Front Desk"))
            .await
            .unwrap();
        let raw = email.formatted();
        let parsed = parse_mail(&raw).unwrap();

        assert_eq!(parsed.headers.get_first_value("To").unwrap(), "a@b.com");
        assert!(parsed.headers.get_first_value("From").unwrap().contains("Front Desk"));
        assert_eq!(parsed.ctype.mimetype, "multipart/mixed");
        assert_eq!(parsed.subparts.len(), 2);
        assert_eq!(parsed.subparts[0].ctype.mimetype, "multipart/alternative");
        assert_eq!(parsed.subparts[1].ctype.mimetype, "application/pdf");
        assert_eq!(parsed.subparts[1].get_body_raw().unwrap(), b"%PDF-1.4 fake");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stored_password_is_read_off_the_runtime() {
        if std::env::var(encryption::PASSWORD_ENV).is_ok() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let credentials = CredentialsConfig {
            key_file: tmp.path().join("key"),
            password_file: tmp.path().join("password"),
        };
        let sender = SmtpSender::new(
            SmtpConfig {
                host: "smtp.example.com".into(),
                port: 587,
                username: "me@example.com".into(),
                security: SmtpSecurity::Starttls,
            },
            credentials.clone(),
            Duration::from_secs(5),
        );
        assert!(matches!(sender.password().await, Err(AppError::Transport(_))));

        encryption::store_password(&credentials, "app-password").unwrap();
        assert_eq!(sender.password().await.unwrap(), "app-password");
    }

    #[tokio::test]
    async fn missing_attachment_file_fails_before_sending() {
        let outbound = OutboundMessage {
            recipients: vec!["a@b.com".into()],
            sender_name: None,
            subject: "Hi".into(),
            text_body: "x".into(),
            html_body: "x".into(),
            attachments: vec![OutgoingAttachment {
                filename: "gone.txt".into(),
                path: "/nonexistent/gone.txt".into(),
                media_type: "text/plain",
                origin: AttachmentOrigin::Saved,
            }],
        };
        assert!(matches!(
            build_message(&outbound, "me@example.com", None).await,
            Err(AppError::Storage { .. })
        ));
    }
}
