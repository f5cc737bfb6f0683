//! Mailbox access error types.

use thiserror::Error;

use crate::attest::RemoteError;

/// Errors that can occur while reading a mailbox over IMAP.
#[derive(Error, Debug)]
pub enum EmailError {
    /// Failed to connect to the IMAP server.
    #[error("IMAP connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS/SSL error during connection.
    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No usable password or access token.
    #[error("Credentials not found: {0}")]
    CredentialsNotFound(String),

    #[error("IMAP protocol error: {0}")]
    ProtocolError(String),

    #[error("IMAP folder '{0}' not found")]
    FolderNotFound(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<async_native_tls::Error> for EmailError {
    fn from(err: async_native_tls::Error) -> Self {
        EmailError::TlsError(err.to_string())
    }
}

impl From<EmailError> for RemoteError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::ConnectionFailed(_) | EmailError::TlsError(_) | EmailError::Timeout(_) => {
                RemoteError::Network(err.to_string())
            }
            EmailError::AuthenticationFailed(_) | EmailError::CredentialsNotFound(_) => {
                RemoteError::Auth(err.to_string())
            }
            EmailError::ProtocolError(_)
            | EmailError::FolderNotFound(_)
            | EmailError::ConfigError(_) => RemoteError::Protocol(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmailError>;
