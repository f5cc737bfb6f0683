//! Error types for the attestation engine and its collaborators.

use thiserror::Error;

/// Reasons an email body does not decode to an attest packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("attest packet markers not found")]
    MissingBlock,

    #[error("malformed line {line} after the BEGIN marker: expected KEY:value")]
    MalformedLine { line: usize },

    #[error("field '{0}' appears more than once")]
    DuplicateField(&'static str),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not hex: '{value}'")]
    NotHex { field: &'static str, value: String },

    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

/// Errors reported by remote collaborators (mailbox search, attester API).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network unreachable, connection reset, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// Credentials rejected or expired.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Remote side failed (5xx).
    #[error("server error {status}: {detail}")]
    Server { status: u16, detail: String },

    /// Remote side refused the request (non-transient 4xx).
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Transient failures are retried on the next scheduled tick without
    /// leaving a trace in the processing log.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_) | RemoteError::Auth(_) | RemoteError::Server { .. }
        )
    }

    /// Detail message suitable for the processing log.
    pub fn detail(&self) -> String {
        match self {
            RemoteError::Server { detail, .. } | RemoteError::Rejected { detail, .. } => {
                detail.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Errors from the local key store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key store unavailable: {0}")]
    Unavailable(String),

    #[error("stored key is unreadable: {0}")]
    Corrupt(String),
}

/// Errors from the crypto collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("could not decrypt private key: {0}")]
    Decrypt(String),

    #[error("could not sign: {0}")]
    Sign(String),
}
