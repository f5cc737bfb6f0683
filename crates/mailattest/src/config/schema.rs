use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attest::identity::{Attester, DEFAULT_ATTESTER, DEFAULT_ATTESTER_SENDER};
use crate::attest::log::DEFAULT_MAX_LOG_ENTRIES;
use crate::attest::scheduler::{WatchSchedule, DEFAULT_INITIAL_DELAY, DEFAULT_POLL_INTERVAL};
use crate::attest::{AttesterRegistry, EngineOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default = "default_attesters")]
    pub attesters: Vec<Attester>,
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub imap: Vec<ImapAccountConfig>,
}

impl Config {
    /// Engine tunables derived from this config.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            attesters: AttesterRegistry::new(self.attesters.clone()),
            schedule: self.watch.schedule(),
            max_log_entries: self.log.max_entries,
        }
    }

    /// Configured database path, or the default under the home directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database.path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }
}

fn default_attesters() -> Vec<Attester> {
    vec![Attester {
        id: DEFAULT_ATTESTER.to_string(),
        senders: vec![DEFAULT_ATTESTER_SENDER.to_string()],
    }]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl WatchConfig {
    pub fn schedule(&self) -> WatchSchedule {
        WatchSchedule {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

fn default_initial_delay_secs() -> u64 {
    DEFAULT_INITIAL_DELAY.as_secs()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
}

fn default_max_entries() -> u32 {
    DEFAULT_MAX_LOG_ENTRIES
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

/// Attester HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// An IMAP mailbox the packet fetcher may read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImapAccountConfig {
    /// The account address whose mailbox this is.
    pub account: String,

    /// IMAP server hostname (e.g., "imap.gmail.com").
    pub host: String,

    #[serde(default = "default_imap_port")]
    pub port: u16,

    /// Must stay `true`; plaintext connections are refused.
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Login name, typically the account address.
    pub username: String,

    pub auth: ImapAuthSettings,

    #[serde(default = "default_inbox")]
    pub folder: String,
}

fn default_imap_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}

fn default_inbox() -> String {
    "INBOX".to_string()
}

/// IMAP authentication. Each secret may be given directly, as a file, or
/// as an environment variable name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImapAuthSettings {
    #[serde(rename = "type", default)]
    pub auth_type: ImapAuthType,

    /// WARNING: stored in plaintext. Prefer `passwordFile` or `passwordEnvVar`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "passwordInsecure",
        alias = "password"
    )]
    pub password_insecure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,

    /// OAuth2 bearer token for XOAUTH2.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "accessTokenInsecure",
        alias = "accessToken"
    )]
    pub access_token_insecure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_env_var: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImapAuthType {
    #[default]
    Password,
    OAuth2,
}
