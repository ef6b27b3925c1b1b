use anyhow::{bail, Context, Result};
use serde::Deserialize;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SETTINGS_PATH: &str = "src/resources/settings.yaml";

// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub uploads: UploadLimits,
    pub mail: MailConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// REST server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub attachments_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub subjects_file: PathBuf,
    pub messages_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadLimits {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            max_files: default_max_files(),
            max_file_size_bytes: default_max_file_size(),
        }
    }
}

fn default_max_files() -> usize {
    10
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub from_address: String,
    pub sender_name: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub transport: TransportConfig,
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Smtp(SmtpConfig),
    Outbox { dir: PathBuf },
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub security: SmtpSecurity,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmtpSecurity {
    #[default]
    Starttls,
    Tls,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
    #[serde(default = "default_password_file")]
    pub password_file: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        CredentialsConfig {
            key_file: default_key_file(),
            password_file: default_password_file(),
        }
    }
}

fn default_key_file() -> PathBuf {
    PathBuf::from(".encryption_key")
}

fn default_password_file() -> PathBuf {
    PathBuf::from(".encrypted_password")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_settings(path: &Path) -> Result<Config> {
    let file = File::open(path)
        .with_context(|| format!("Cannot find settings at {}", path.display()))?;
    let reader = BufReader::new(file);

    // Parse the YAML file into the Config struct
    let config: Config = serde_yaml::from_reader(reader)
        .with_context(|| format!("Cannot deserialize settings from {}", path.display()))?;

    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.uploads.max_files == 0 {
            bail!("uploads.max_files must be at least 1");
        }
        if self.uploads.max_file_size_bytes == 0 {
            bail!("uploads.max_file_size_bytes must be at least 1");
        }
        if self.storage.staging_dir == self.storage.attachments_dir {
            bail!("storage.staging_dir must differ from storage.attachments_dir");
        }
        if self.mail.timeout_seconds == 0 {
            bail!("mail.timeout_seconds must be at least 1");
        }
        if self.mail.from_address.trim().is_empty() {
            bail!("mail.from_address must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
server:
  host: 127.0.0.1
  port: 8080
storage:
  attachments_dir: data/uploads
  staging_dir: data/staging
  subjects_file: data/subjects.txt
  messages_file: data/messages.txt
mail:
  from_address: me@example.com
  transport:
    kind: smtp
    host: smtp.example.com
    port: 587
    username: me@example.com
"#;

    #[test]
    fn defaults_fill_optional_sections() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.uploads.max_files, 10);
        assert_eq!(config.uploads.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.mail.timeout(), Duration::from_secs(30));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.credentials.key_file, PathBuf::from(".encryption_key"));
        match config.mail.transport {
            TransportConfig::Smtp(smtp) => assert_eq!(smtp.security, SmtpSecurity::Starttls),
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn outbox_transport_parses() {
        let yaml = SAMPLE.replace(
            "    kind: smtp\n    host: smtp.example.com\n    port: 587\n    username: me@example.com\n",
            "    kind: outbox\n    dir: data/outbox\n",
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(matches!(config.mail.transport, TransportConfig::Outbox { .. }));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        let yaml = format!("{}uploads:\n  max_files: 0\n", SAMPLE);
        std::fs::write(&path, yaml).unwrap();
        assert!(load_settings(&path).is_err());
    }

    #[test]
    fn shared_staging_and_attachments_dir_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, SAMPLE.replace("data/staging", "data/uploads")).unwrap();
        let err = load_settings(&path).unwrap_err();
        assert!(err.to_string().contains("staging_dir"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(&dir.path().join("nope.yaml")).is_err());
    }
}
