//! IMAP client for reading attest packets from a mailbox.

use std::time::Duration;

use async_imap::Session;
use async_native_tls::TlsConnector;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::ExposeSecret;

use crate::config::{ImapAccountConfig, ImapAuthType};
use crate::secrets::resolve_imap_credential;

use super::error::{EmailError, Result};

/// Upper bound for name resolution, TCP connect, TLS handshake and login
/// together.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

type AsyncTcpStream = async_io::Async<std::net::TcpStream>;
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

struct XOAuth2Authenticator {
    response: String,
}

impl async_imap::Authenticator for XOAuth2Authenticator {
    type Response = String;

    fn process(&mut self, _data: &[u8]) -> Self::Response {
        std::mem::take(&mut self.response)
    }
}

/// Read-only IMAP session for one configured account.
pub struct ImapClient {
    session: Option<Session<TlsStream>>,
    config: ImapAccountConfig,
}

impl ImapClient {
    pub fn new(config: ImapAccountConfig) -> Self {
        Self {
            session: None,
            config,
        }
    }

    /// Connects to the IMAP server and authenticates.
    pub async fn connect(&mut self) -> Result<()> {
        self.connect_within(CONNECT_TIMEOUT).await
    }

    async fn connect_within(&mut self, limit: Duration) -> Result<()> {
        if self.session.is_some() {
            debug!("Already connected to IMAP server");
            return Ok(());
        }

        if !self.config.use_tls {
            return Err(EmailError::ConfigError(
                "TLS is required for secure email connections".to_string(),
            ));
        }

        let session = tokio::time::timeout(limit, self.open_session())
            .await
            .map_err(|_| {
                EmailError::Timeout(format!(
                    "connecting to {}:{}",
                    self.config.host, self.config.port
                ))
            })??;

        info!("Authenticated to IMAP server as {}", self.config.username);
        self.session = Some(session);
        Ok(())
    }

    async fn open_session(&self) -> Result<Session<TlsStream>> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Connecting to IMAP server at {}", addr);

        let tcp_stream = connect_tcp(&addr).await?;

        let tls_stream = TlsConnector::new()
            .connect(&self.config.host, tcp_stream)
            .await?;
        let client = async_imap::Client::new(tls_stream);

        let credential = resolve_imap_credential(&self.config.auth)
            .map_err(|e| EmailError::CredentialsNotFound(e.to_string()))?;

        match self.config.auth.auth_type {
            ImapAuthType::Password => {
                if self.config.auth.password_insecure.is_some() {
                    warn!(
                        "Using a direct password value (passwordInsecure) is not recommended. \
                         Consider passwordEnvVar or passwordFile instead."
                    );
                }
                client
                    .login(&self.config.username, credential.expose_secret())
                    .await
                    .map_err(|(e, _)| EmailError::AuthenticationFailed(e.to_string()))
            }
            ImapAuthType::OAuth2 => {
                // base64("user=" + user + "^Aauth=Bearer " + token + "^A^A")
                let auth_string = format!(
                    "user={}\x01auth=Bearer {}\x01\x01",
                    self.config.username,
                    credential.expose_secret()
                );
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    auth_string.as_bytes(),
                );
                client
                    .authenticate("XOAUTH2", XOAuth2Authenticator { response: encoded })
                    .await
                    .map_err(|(e, _)| EmailError::AuthenticationFailed(e.to_string()))
            }
        }
    }

    fn session(&mut self) -> Result<&mut Session<TlsStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| EmailError::ConnectionFailed("Not connected".to_string()))
    }

    /// Opens a folder read-only with EXAMINE so nothing gets marked as read.
    pub async fn examine_folder(&mut self, folder: &str) -> Result<()> {
        let session = self.session()?;
        debug!("Examining folder: {}", folder);

        let mailbox = session.examine(folder).await.map_err(|e| {
            let message = e.to_string();
            if message.contains("Mailbox doesn't exist") || message.contains("NO") {
                EmailError::FolderNotFound(folder.to_string())
            } else {
                EmailError::ProtocolError(message)
            }
        })?;

        debug!("Folder '{}' holds {} messages", folder, mailbox.exists);
        Ok(())
    }

    /// Runs `UID SEARCH` with the given criteria. UIDs are returned ascending.
    pub async fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        let session = self.session()?;
        debug!("Searching with criteria: {}", criteria);

        let uids = session
            .uid_search(criteria)
            .await
            .map_err(|e| EmailError::ProtocolError(e.to_string()))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        debug!("Found {} messages matching search", uid_list.len());
        Ok(uid_list)
    }

    /// Fetches full messages by UID with BODY.PEEK[] to avoid marking them read.
    pub async fn fetch_emails_peek(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let uid_set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");
        debug!("Fetching {} emails with UIDs: {}", uids.len(), uid_set);

        let session = self.session()?;
        let mut messages = session
            .uid_fetch(&uid_set, "(UID BODY.PEEK[])")
            .await
            .map_err(|e| EmailError::ProtocolError(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(message_result) = messages.next().await {
            match message_result {
                Ok(message) => {
                    if let (Some(uid), Some(body)) = (message.uid, message.body()) {
                        results.push((uid, body.to_vec()));
                    } else {
                        warn!("Message missing UID or body");
                    }
                }
                Err(e) => {
                    warn!("Error fetching message: {}", e);
                }
            }
        }
        drop(messages);

        results.sort_by_key(|(uid, _)| *uid);
        Ok(results)
    }

    /// Logs out from the IMAP server.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            debug!("Disconnecting from IMAP server");
            session
                .logout()
                .await
                .map_err(|e| EmailError::ProtocolError(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

/// Resolves `addr` and connects to the first address that accepts, without
/// blocking the runtime.
async fn connect_tcp(addr: &str) -> Result<AsyncTcpStream> {
    let candidates = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| EmailError::ConnectionFailed(format!("{}: {}", addr, e)))?;

    let mut last_error = None;
    for candidate in candidates {
        match AsyncTcpStream::connect(candidate).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connecting to {} failed: {}", candidate, e);
                last_error = Some(e);
            }
        }
    }

    Err(EmailError::ConnectionFailed(match last_error {
        Some(e) => format!("{}: {}", addr, e),
        None => format!("{}: no addresses resolved", addr),
    }))
}

impl Drop for ImapClient {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("ImapClient dropped without explicit disconnect - session will be closed");
        }
    }
}
