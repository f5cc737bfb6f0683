pub mod api;
pub mod attest;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod logging;
pub mod secrets;

pub use api::HttpAttesterClient;
pub use attest::{
    AttestEngine, AttestPacket, AttestationApi, Collaborators, Crypto, CycleReport,
    EngineOptions, KeyStore, LogEntry, PacketFetcher,
};
pub use config::{load_config, load_config_from_str, Config};
pub use db::Database;
pub use email::ImapPacketFetcher;
pub use error::{AttestError, ConfigError, Result};
pub use secrets::{resolve_secret, SecretError};
