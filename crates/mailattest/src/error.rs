use std::path::PathBuf;
use thiserror::Error;

use crate::attest::{PacketError, RemoteError};
use crate::email::EmailError;
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum AttestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("Invalid attest packet: {0}")]
    Packet(#[from] PacketError),

    #[error("Attester API error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Unknown attester '{0}'")]
    UnknownAttester(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid attester '{id}': {reason}")]
    InvalidAttester { id: String, reason: String },

    #[error("Invalid IMAP account '{account}': {reason}")]
    InvalidImapAccount { account: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AttestError>;
