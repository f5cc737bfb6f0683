pub mod loader;
pub mod schema;

pub use crate::error::ConfigError;
pub use loader::{load_config, load_config_from_str, validate_config};
pub use schema::{
    ApiConfig, Config, DatabaseConfig, ImapAccountConfig, ImapAuthSettings, ImapAuthType,
    LogConfig, WatchConfig,
};
