use std::io::ErrorKind;
use std::path::PathBuf;

use log::{error, info, warn};
use rand::Rng;
use tokio::fs;

use crate::error::{AppError, Result};
use crate::settings::UploadLimits;
use crate::storage::{AttachmentStore, PromoteOutcome};

/// An uploaded file parked in the scratch area for the duration of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpload {
    pub original_name: String,
    pub path: PathBuf,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct UploadIntake {
    staging_dir: PathBuf,
    limits: UploadLimits,
}

/// Keeps only the final path component of a client-supplied filename.
pub fn sanitize_filename(raw: &str) -> String {
    let last = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("").trim();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}

impl UploadIntake {
    pub fn new(staging_dir: impl Into<PathBuf>, limits: UploadLimits) -> Self {
        UploadIntake {
            staging_dir: staging_dir.into(),
            limits,
        }
    }

    /// Upper bound for a whole send request body.
    pub fn request_body_limit(&self) -> usize {
        self.limits
            .max_files
            .saturating_mul(self.limits.max_file_size_bytes)
            .saturating_add(1024 * 1024)
    }

    /// Fails once the request carries more than `max_files` files.
    pub fn check_count(&self, count: usize) -> Result<()> {
        if count > self.limits.max_files {
            return Err(AppError::PayloadTooLarge(format!(
                "Too many files: at most {} attachments per request",
                self.limits.max_files
            )));
        }
        Ok(())
    }

    pub fn check_size(&self, name: &str, size: usize) -> Result<()> {
        if size > self.limits.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File {} exceeds the {} byte limit",
                name, self.limits.max_file_size_bytes
            )));
        }
        Ok(())
    }

    pub async fn stage(&self, original_name: &str, bytes: &[u8]) -> Result<StagedUpload> {
        let original_name = sanitize_filename(original_name);
        self.check_size(&original_name, bytes.len())?;
        fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| AppError::storage(&self.staging_dir, e))?;

        let staged_name = format!(
            "{}-{:08x}-{}",
            chrono::Utc::now().timestamp_millis(),
            rand::thread_rng().gen::<u32>(),
            original_name
        );
        let path = self.staging_dir.join(staged_name);
        fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::storage(&path, e))?;

        Ok(StagedUpload {
            original_name,
            path,
            size: bytes.len(),
        })
    }

    /// Folds staged uploads into the store after a confirmed send.
    pub async fn promote_all(&self, staged: &[StagedUpload], store: &AttachmentStore) {
        for upload in staged {
            match store.promote(&upload.path, &upload.original_name).await {
                Ok(PromoteOutcome::Promoted) => {}
                Ok(PromoteOutcome::KeptExisting) => {
                    info!("Kept existing {} in attachment store", upload.original_name)
                }
                Err(e) => {
                    error!("Cannot promote {}: {}", upload.original_name, e);
                    discard(upload).await;
                }
            }
        }
    }

    pub async fn discard_all(&self, staged: &[StagedUpload]) {
        for upload in staged {
            discard(upload).await;
        }
    }
}

async fn discard(upload: &StagedUpload) {
    if let Err(e) = fs::remove_file(&upload.path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Cannot discard staged {}: {}", upload.path.display(), e);
        }
    }
}
