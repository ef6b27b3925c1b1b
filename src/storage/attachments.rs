use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::fs;

use crate::error::{AppError, Result};

/// Directory of saved attachments keyed by filename.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    Promoted,
    /// A stored file already had that name; the incoming file was dropped.
    KeptExisting,
}

/// A stored name must be a single, visible path component.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\', '\0'])
}

impl AttachmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        AttachmentStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::storage(&self.dir, e))
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::storage(&self.dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::storage(&self.dir, e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => names.push(name),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }

    /// Path of an existing stored file, if `name` refers to one.
    pub async fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !is_valid_name(name) {
            return None;
        }
        let path = self.dir.join(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(AppError::InvalidRequest(format!("Invalid filename: {:?}", name)));
        }
        let path = self.dir.join(name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted saved attachment {}", name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("File not found: {}", name)))
            }
            Err(e) => Err(AppError::storage(path, e)),
        }
    }

    /// Moves `staged` into the store as `name`. An existing file of the same
    /// name is never overwritten.
    pub async fn promote(&self, staged: &Path, name: &str) -> Result<PromoteOutcome> {
        if !is_valid_name(name) {
            return Err(AppError::InvalidRequest(format!("Invalid filename: {:?}", name)));
        }
        self.init().await?;
        let target = self.dir.join(name);

        if fs::try_exists(&target).await.unwrap_or(false) {
            debug!("{} already stored, discarding staged copy", name);
            remove_quietly(staged).await;
            return Ok(PromoteOutcome::KeptExisting);
        }

        if let Err(rename_err) = fs::rename(staged, &target).await {
            // rename fails across filesystems
            warn!("rename of {} failed ({}), copying instead", staged.display(), rename_err);
            fs::copy(staged, &target)
                .await
                .map_err(|e| AppError::storage(&target, e))?;
            remove_quietly(staged).await;
        }
        info!("Saved attachment {}", name);
        Ok(PromoteOutcome::Promoted)
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Cannot remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_of_uninitialized_store_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_hidden_files_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path());
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a.pdf"), "a").unwrap();
        std::fs::write(tmp.path().join(".gitkeep"), "").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["a.pdf", "b.txt"]);
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path());
        std::fs::write(tmp.path().join("x.txt"), "x").unwrap();

        store.delete("x.txt").await.unwrap();
        assert!(matches!(store.delete("x.txt").await, Err(AppError::NotFound(_))));
        assert!(matches!(store.delete("ghost.txt").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path().join("store"));
        assert!(matches!(
            store.delete("../secret").await,
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn promote_never_overwrites_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path().join("store"));
        store.init().await.unwrap();
        std::fs::write(store.dir().join("x.txt"), "original").unwrap();

        let staged = tmp.path().join("staged-x.txt");
        std::fs::write(&staged, "incoming").unwrap();

        let outcome = store.promote(&staged, "x.txt").await.unwrap();
        assert_eq!(outcome, PromoteOutcome::KeptExisting);
        assert_eq!(std::fs::read_to_string(store.dir().join("x.txt")).unwrap(), "original");
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn promote_moves_new_file_into_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path().join("store"));
        let staged = tmp.path().join("123-report.pdf");
        std::fs::write(&staged, "pdf").unwrap();

        let outcome = store.promote(&staged, "report.pdf").await.unwrap();
        assert_eq!(outcome, PromoteOutcome::Promoted);
        assert_eq!(store.list().await.unwrap(), vec!["report.pdf"]);
        assert!(store.resolve("report.pdf").await.is_some());
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn resolve_ignores_unknown_and_invalid_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path());
        assert!(store.resolve("missing.txt").await.is_none());
        assert!(store.resolve("../etc/passwd").await.is_none());
        assert!(store.resolve("").await.is_none());
    }
}
