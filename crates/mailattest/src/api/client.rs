//! HTTP client for the attester confirmation endpoints.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::attest::{AttestResponse, AttestationApi, RemoteError};
use crate::config::ApiConfig;

/// Maximum length for error bodies kept in errors and the processing log.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Default connect timeout for attester requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall timeout for attester requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ConfirmRequest<'a> {
    signed_message: &'a str,
}

/// [`AttestationApi`] over HTTPS.
#[derive(Clone)]
pub struct HttpAttesterClient {
    client: Client,
    base_url: String,
}

impl HttpAttesterClient {
    pub fn new(config: &ApiConfig) -> Result<Self, RemoteError> {
        Self::with_timeouts(
            &config.base_url,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn with_timeouts(
        base_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| RemoteError::Protocol(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn confirm(&self, path: &str, signed: &str) -> Result<AttestResponse, RemoteError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&ConfirmRequest {
                signed_message: signed,
            })
            .send()
            .await
            .map_err(|e| RemoteError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: AttestResponse = serde_json::from_str(&body).map_err(|e| {
            RemoteError::Protocol(format!(
                "Unexpected attester response ({}): {}",
                e,
                sanitize_error_body(&body)
            ))
        })?;

        info!("Attester answered {} with attested={}", path, parsed.attested);
        Ok(parsed)
    }
}

#[async_trait]
impl AttestationApi for HttpAttesterClient {
    async fn initial_confirm(&self, signed: &str) -> Result<AttestResponse, RemoteError> {
        self.confirm("initial/confirm", signed).await
    }

    async fn replace_confirm(&self, signed: &str) -> Result<AttestResponse, RemoteError> {
        self.confirm("replace/confirm", signed).await
    }
}

/// Maps a non-success status to the matching error class.
fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let detail = sanitize_error_body(body);
    match status.as_u16() {
        401 | 403 => RemoteError::Auth(format!("{}: {}", status, detail)),
        code if status.is_server_error() => RemoteError::Server {
            status: code,
            detail,
        },
        code => RemoteError::Rejected {
            status: code,
            detail,
        },
    }
}

/// Truncates a response body so a misbehaving server cannot flood the log.
fn sanitize_error_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}
