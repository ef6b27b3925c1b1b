mod files;
mod send;
mod templates;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    routing::{get, post},
    Extension, Router,
};
use log::info;
use std::sync::Arc;

use crate::error::AppError;
use crate::mail_composer::render::BodyRenderer;
use crate::mail_sender::MailSender;
use crate::settings::Config;
use crate::storage::{AttachmentStore, TemplateStore};
use crate::upload_intake::UploadIntake;

/// Components shared by every request handler.
pub struct AppState {
    pub attachments: AttachmentStore,
    pub subjects: TemplateStore,
    pub messages: TemplateStore,
    pub intake: UploadIntake,
    pub renderer: BodyRenderer,
    pub sender: MailSender,
}

impl AppState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(AppState {
            attachments: AttachmentStore::new(&config.storage.attachments_dir),
            subjects: TemplateStore::subjects(&config.storage.subjects_file),
            messages: TemplateStore::messages(&config.storage.messages_file),
            intake: UploadIntake::new(&config.storage.staging_dir, config.uploads.clone()),
            renderer: BodyRenderer::new()?,
            sender: MailSender::from_config(&config.mail, &config.credentials),
        })
    }
}

pub(crate) fn json_error(rejection: JsonRejection) -> AppError {
    AppError::InvalidRequest(rejection.body_text())
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.intake.request_body_limit();

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/send-email", post(send::send_email))
        .route("/api/files", get(files::list_files))
        .route("/api/files/delete", post(files::delete_file))
        .route("/api/templates/subjects", get(templates::list_subjects))
        .route("/api/templates/subjects/add", post(templates::add_subject))
        .route("/api/templates/subjects/delete", post(templates::delete_subject))
        .route("/api/templates/messages", get(templates::list_messages))
        .route("/api/templates/messages/add", post(templates::add_message))
        .route("/api/templates/messages/delete", post(templates::delete_message))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(Extension(state))
}

async fn start_server(config: &Config, router: Router) -> anyhow::Result<()> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Cannot bind {}", address))?;
    info!("Server running on http://{}", address);
    axum::serve(listener, router).await?;
    Ok(())
}

pub async fn entrypoint(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    state.attachments.init().await?;
    info!("Attachment store at {}", state.attachments.dir().display());

    let router = create_router(Arc::new(state));
    start_server(config, router).await
}
