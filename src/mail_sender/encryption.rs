use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::fs;
use std::path::Path;

use crate::settings::CredentialsConfig;

pub const PASSWORD_ENV: &str = "QRMAIL_SMTP_PASSWORD";
const NONCE_LEN: usize = 12;

pub fn get_encryption_key(key_path: &Path) -> Result<Aes256Gcm> {
    let key = if key_path.exists() {
        // Read existing key
        let key_bytes = fs::read(key_path)
            .with_context(|| format!("Cannot read key file {}", key_path.display()))?;
        Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create cipher from key: {}", e))?
    } else {
        // Generate new key
        let mut key_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key_bytes);
        fs::write(key_path, key_bytes)
            .with_context(|| format!("Cannot write key file {}", key_path.display()))?;
        Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create cipher from new key: {}", e))?
    };
    Ok(key)
}

pub fn encrypt_password(cipher: &Aes256Gcm, password: &str) -> Result<String> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, password.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to encrypt password: {}", e))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&combined))
}

pub fn decrypt_password(cipher: &Aes256Gcm, encrypted: &str) -> Result<String> {
    let combined = BASE64
        .decode(encrypted.trim())
        .map_err(|e| anyhow::anyhow!("Failed to decode base64: {}", e))?;
    if combined.len() <= NONCE_LEN {
        bail!("Encrypted password is truncated");
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow::anyhow!("Failed to decrypt password: {}", e))?;

    String::from_utf8(plaintext)
        .map_err(|e| anyhow::anyhow!("Failed to convert decrypted bytes to string: {}", e))
}

/// SMTP password from the environment, else from the encrypted password file.
pub fn smtp_password(config: &CredentialsConfig) -> Result<Option<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(Some(password));
        }
    }
    if !config.password_file.exists() {
        return Ok(None);
    }
    if !config.key_file.exists() {
        bail!(
            "Password file {} exists but key file {} is missing",
            config.password_file.display(),
            config.key_file.display()
        );
    }
    let cipher = get_encryption_key(&config.key_file)?;
    let encrypted = fs::read_to_string(&config.password_file)
        .with_context(|| format!("Cannot read {}", config.password_file.display()))?;
    decrypt_password(&cipher, &encrypted).map(Some)
}

pub fn store_password(config: &CredentialsConfig, password: &str) -> Result<()> {
    let cipher = get_encryption_key(&config.key_file)?;
    let encrypted = encrypt_password(&cipher, password)?;
    fs::write(&config.password_file, encrypted)
        .with_context(|| format!("Cannot write {}", config.password_file.display()))
}

pub fn prompt_and_store(config: &CredentialsConfig) -> Result<()> {
    let password = rpassword::prompt_password("Enter your SMTP password: ")?;
    if password.is_empty() {
        bail!("Empty password, nothing stored");
    }
    store_password(config, &password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> CredentialsConfig {
        CredentialsConfig {
            key_file: dir.join("key"),
            password_file: dir.join("password"),
        }
    }

    #[test]
    fn stored_password_decrypts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        store_password(&config, "app-password").unwrap();

        let cipher = get_encryption_key(&config.key_file).unwrap();
        let encrypted = fs::read_to_string(&config.password_file).unwrap();
        assert_ne!(encrypted, "app-password");
        assert_eq!(decrypt_password(&cipher, &encrypted).unwrap(), "app-password");
    }

    #[test]
    fn truncated_ciphertext_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cipher = get_encryption_key(&tmp.path().join("key")).unwrap();
        assert!(decrypt_password(&cipher, &BASE64.encode([1u8; 4])).is_err());
    }

    #[test]
    fn missing_password_file_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        if std::env::var(PASSWORD_ENV).is_err() {
            assert!(smtp_password(&config(tmp.path())).unwrap().is_none());
        }
    }
}
