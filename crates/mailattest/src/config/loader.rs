use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{Config, ImapAuthType};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.watch.poll_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "watch.pollIntervalSecs must be greater than zero".to_string(),
        });
    }

    if config.log.max_entries == 0 {
        return Err(ConfigError::Validation {
            message: "log.maxEntries must be at least 1".to_string(),
        });
    }

    if config.attesters.is_empty() {
        return Err(ConfigError::Validation {
            message: "At least one attester is required".to_string(),
        });
    }

    let mut attester_ids = HashSet::new();
    for attester in &config.attesters {
        if attester.id.trim().is_empty() {
            return Err(ConfigError::InvalidAttester {
                id: attester.id.clone(),
                reason: "Attester ID must not be empty".to_string(),
            });
        }
        if !attester_ids.insert(&attester.id) {
            return Err(ConfigError::InvalidAttester {
                id: attester.id.clone(),
                reason: "Duplicate attester ID".to_string(),
            });
        }
        if attester.senders.is_empty() {
            return Err(ConfigError::InvalidAttester {
                id: attester.id.clone(),
                reason: "At least one sender address is required".to_string(),
            });
        }
        if let Some(sender) = attester.senders.iter().find(|s| !s.contains('@')) {
            return Err(ConfigError::InvalidAttester {
                id: attester.id.clone(),
                reason: format!("Invalid sender address '{}'", sender),
            });
        }
    }

    let base_url = &config.api.base_url;
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation {
            message: format!(
                "api.baseUrl must start with http:// or https://, got '{}'",
                base_url
            ),
        });
    }

    let mut imap_accounts = HashSet::new();
    for imap in &config.imap {
        let invalid = |reason: &str| ConfigError::InvalidImapAccount {
            account: imap.account.clone(),
            reason: reason.to_string(),
        };

        if !imap.account.contains('@') {
            return Err(invalid("Account must be an email address"));
        }
        if !imap_accounts.insert(imap.account.to_lowercase()) {
            return Err(invalid("Duplicate IMAP account"));
        }
        if !imap.use_tls {
            return Err(invalid("TLS is required for IMAP connections"));
        }

        let auth = &imap.auth;
        let has_source = match auth.auth_type {
            ImapAuthType::Password => {
                auth.password_insecure.is_some()
                    || auth.password_file.is_some()
                    || auth.password_env_var.is_some()
            }
            ImapAuthType::OAuth2 => {
                auth.access_token_insecure.is_some()
                    || auth.access_token_file.is_some()
                    || auth.access_token_env_var.is_some()
            }
        };
        if !has_source {
            return Err(invalid("No credential source configured"));
        }
    }

    Ok(())
}
