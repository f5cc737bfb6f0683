//! Secret resolution for mailbox credentials.
//!
//! Each secret can come from one of three sources, tried in order:
//!
//! 1. **Direct value** - quick local testing (`"password": "..."`)
//! 2. **File reference** - Docker secrets (`"passwordFile": "/run/secrets/imap"`)
//! 3. **Env var reference** - production (`"passwordEnvVar": "IMAP_PASSWORD"`)

use secrecy::SecretString;
use std::fs;

use crate::config::{ImapAuthSettings, ImapAuthType};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first non-empty source: direct value, file
/// contents, then environment variable. File and env values are trimmed.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return match fs::read_to_string(&expanded) {
            Ok(content) => Ok(SecretString::from(content.trim().to_string())),
            Err(e) => Err(SecretError::FileReadError {
                path: expanded,
                source: e,
            }),
        };
    }

    if let Some(var_name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(var_name) {
            Ok(value) => Ok(SecretString::from(value.trim())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: var_name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: var_name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Resolves the password or access token an IMAP account authenticates with.
pub fn resolve_imap_credential(auth: &ImapAuthSettings) -> Result<SecretString> {
    match auth.auth_type {
        ImapAuthType::Password => resolve_secret(
            auth.password_insecure.as_deref(),
            auth.password_file.as_deref(),
            auth.password_env_var.as_deref(),
        ),
        ImapAuthType::OAuth2 => resolve_secret(
            auth.access_token_insecure.as_deref(),
            auth.access_token_file.as_deref(),
            auth.access_token_env_var.as_deref(),
        ),
    }
}

/// Expands a leading `~` to the home directory. `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
