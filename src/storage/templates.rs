use std::io::ErrorKind;
use std::path::PathBuf;

use log::info;
use tokio::fs;

use crate::error::{AppError, Result};

pub const MESSAGE_DELIMITER: &str = "---MESSAGE-END---";

/// How entries are laid out in the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One entry per line.
    Lines,
    /// Multi-line entries each terminated by [`MESSAGE_DELIMITER`] on its own line.
    Blocks,
}

/// Ordered, duplicate-free collection of text snippets in a flat file.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    path: PathBuf,
    encoding: Encoding,
}

impl TemplateStore {
    pub fn subjects(path: impl Into<PathBuf>) -> Self {
        TemplateStore {
            path: path.into(),
            encoding: Encoding::Lines,
        }
    }

    pub fn messages(path: impl Into<PathBuf>) -> Self {
        TemplateStore {
            path: path.into(),
            encoding: Encoding::Blocks,
        }
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(decode(&raw, self.encoding)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AppError::storage(&self.path, e)),
        }
    }

    pub async fn add(&self, text: &str) -> Result<()> {
        let entry = self.validate(text)?;
        let mut entries = self.list().await?;
        if entries.iter().any(|existing| existing == entry) {
            return Ok(());
        }
        entries.push(entry.to_string());
        self.rewrite(&entries).await?;
        info!("Added template to {}", self.path.display());
        Ok(())
    }

    /// Removes every entry equal to the trimmed `text`. Unknown text is a no-op.
    pub async fn delete(&self, text: &str) -> Result<()> {
        let target = text.trim();
        if target.is_empty() {
            return Err(AppError::InvalidRequest("Template text is required".into()));
        }
        let entries = self.list().await?;
        let remaining: Vec<String> = entries
            .iter()
            .filter(|entry| entry.as_str() != target)
            .cloned()
            .collect();
        if remaining.len() == entries.len() {
            return Ok(());
        }
        self.rewrite(&remaining).await?;
        info!("Deleted template from {}", self.path.display());
        Ok(())
    }

    fn validate<'a>(&self, text: &'a str) -> Result<&'a str> {
        let entry = text.trim();
        if entry.is_empty() {
            return Err(AppError::InvalidRequest("Template text is required".into()));
        }
        match self.encoding {
            Encoding::Lines if entry.contains(['\n', '\r']) => Err(AppError::InvalidRequest(
                "Subject templates must be a single line".into(),
            )),
            Encoding::Blocks if entry.contains(MESSAGE_DELIMITER) => Err(AppError::InvalidRequest(
                format!("Message templates cannot contain {}", MESSAGE_DELIMITER),
            )),
            _ => Ok(entry),
        }
    }

    async fn rewrite(&self, entries: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage(parent, e))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, encode(entries, self.encoding))
            .await
            .map_err(|e| AppError::storage(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::storage(&self.path, e))
    }
}

fn encode(entries: &[String], encoding: Encoding) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(entry);
        out.push('\n');
        if encoding == Encoding::Blocks {
            out.push_str(MESSAGE_DELIMITER);
            out.push('\n');
        }
    }
    out
}

fn decode(raw: &str, encoding: Encoding) -> Vec<String> {
    let segments: Vec<&str> = match encoding {
        Encoding::Lines => raw.lines().collect(),
        Encoding::Blocks => raw.split(MESSAGE_DELIMITER).collect(),
    };
    segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
