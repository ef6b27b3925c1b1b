use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the stores, the composer and the mail transports.
#[derive(Error, Debug)]
pub enum AppError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    InvalidRequest(String),

    /// The named entry does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Upload count or size ceiling exceeded.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// The mail provider rejected or failed the send.
    #[error("Failed to send email: {0}")]
    Transport(String),

    #[error("Mail transport did not answer within {0:?}")]
    TransportTimeout(Duration),

    #[error("Cannot render message body: {0}")]
    Render(String),

    /// Filesystem failure on a store or staging area.
    #[error("Storage error on '{path}': {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TransportTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("{}", self);
        }
        (
            status,
            Json(json!({ "success": false, "message": self.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        assert_eq!(AppError::InvalidRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::PayloadTooLarge("x".into()).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(AppError::Transport("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::TransportTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn transport_message_is_surfaced() {
        let err = AppError::Transport("535 Authentication failed".into());
        assert_eq!(err.to_string(), "Failed to send email: 535 Authentication failed");
    }
}
