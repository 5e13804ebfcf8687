//! Configuration for the conversation store and its HTTP surface.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::store::core::errors::{ChatError, ChatResult};

/// Environment variable overriding [`StorageConfig::sqlite_path`].
pub const ENV_DB_PATH: &str = "CHATVAULT_DB_PATH";
/// Environment variable overriding [`ServerConfig::host`].
pub const ENV_HOST: &str = "CHATVAULT_HOST";
/// Environment variable overriding [`ServerConfig::port`].
pub const ENV_PORT: &str = "CHATVAULT_PORT";
/// Environment variable overriding [`ServerConfig::default_locale`].
pub const ENV_LOCALE: &str = "CHATVAULT_LOCALE";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Storage settings.
    pub storage: StorageConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl ChatConfig {
    /// Defaults overridden by `CHATVAULT_*` environment variables.
    ///
    /// Unparsable values are ignored and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(host) = std::env::var(ENV_HOST).ok().and_then(|h| h.parse().ok()) {
            config.server.host = host;
        }
        if let Some(port) = std::env::var(ENV_PORT).ok().and_then(|p| p.parse().ok()) {
            config.server.port = port;
        }
        if let Ok(locale) = std::env::var(ENV_LOCALE) {
            config.server.default_locale = locale;
        }
        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        self.storage.validate()?;

        if self.server.default_locale.trim().is_empty() {
            return Err(ChatError::InvalidConfig(
                "server.default_locale must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Conversation table name.
    pub conversation_table: String,
    /// Message table name.
    pub message_table: String,
    /// Table of deleted conversation ids.
    pub tombstone_table: String,
}

impl StorageConfig {
    /// Validate storage settings.
    ///
    /// Table names are interpolated into SQL, so only plain identifiers pass.
    ///
    /// # Errors
    /// Returns an error if a table name is not a plain identifier, names
    /// collide, or the path is empty.
    pub fn validate(&self) -> ChatResult<()> {
        let tables = [
            ("storage.conversation_table", &self.conversation_table),
            ("storage.message_table", &self.message_table),
            ("storage.tombstone_table", &self.tombstone_table),
        ];

        for (field, table) in tables {
            if !is_sql_identifier(table) {
                return Err(ChatError::InvalidConfig(format!(
                    "{field} must be a plain SQL identifier, got {table:?}"
                )));
            }
        }

        if self.conversation_table == self.message_table
            || self.conversation_table == self.tombstone_table
            || self.message_table == self.tombstone_table
        {
            return Err(ChatError::InvalidConfig(
                "storage table names must be distinct".to_string(),
            ));
        }

        if self.sqlite_path.as_os_str().is_empty() {
            return Err(ChatError::InvalidConfig(
                "storage.sqlite_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("chatvault.sqlite"),
            conversation_table: "conversations".to_string(),
            message_table: "conversation_messages".to_string(),
            tombstone_table: "conversation_tombstones".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Loopback by default: the API serves a local client.
    pub host: IpAddr,
    /// Listening port.
    pub port: u16,
    /// Locale used for month buckets when a request names none.
    pub default_locale: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            default_locale: "en-US".to_string(),
        }
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
